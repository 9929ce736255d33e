//! Property-based tests for the `friends` invariants.
//!
//! Random follow/unfollow sequences are applied through the client paths,
//! with change events handled at random points. Once the feed is quiet:
//! - symmetry: `b ∈ friends(a)` iff `a ∈ friends(b)`
//! - mutuality: `b ∈ friends(a)` iff `a` and `b` follow each other

mod helpers;

use helpers::{id, Harness};
use memories_core::profile::UserProfile;
use proptest::prelude::*;

const USERS: [&str; 5] = ["ana", "ben", "cai", "dee", "eli"];

#[derive(Debug, Clone)]
struct Step {
    from: usize,
    to: usize,
    follow: bool,
    drain_after: bool,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    (0..USERS.len(), 0..USERS.len(), any::<bool>(), any::<bool>()).prop_map(
        |(from, to, follow, drain_after)| Step {
            from,
            to,
            follow,
            drain_after,
        },
    )
}

async fn apply(steps: &[Step]) -> Vec<UserProfile> {
    let mut h = Harness::with_users(&USERS).await;
    for step in steps {
        // Self-follows are rejected by the client paths.
        if step.from == step.to {
            continue;
        }
        let (from, to) = (USERS[step.from], USERS[step.to]);
        if step.follow {
            h.follow(from, to).await;
        } else {
            h.unfollow(from, to).await;
        }
        if step.drain_after {
            h.drain().await;
        }
    }
    h.drain().await;

    let mut profiles = Vec::new();
    for name in USERS {
        profiles.push(h.graph.profile(&id(name)).await.unwrap().unwrap());
    }
    profiles
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: after quiescence, friends is symmetric and equals mutual follows
    #[test]
    fn friends_match_mutual_follows(steps in prop::collection::vec(step_strategy(), 0..40)) {
        let profiles = block_on(apply(&steps));

        for a in &profiles {
            prop_assert!(!a.friends.contains(&a.id), "{} lists itself", a.id);
            for b in &profiles {
                if a.id == b.id {
                    continue;
                }
                prop_assert_eq!(
                    a.friends.contains(&b.id),
                    b.friends.contains(&a.id),
                    "asymmetric friendship between {} and {}", a.id, b.id
                );
                prop_assert_eq!(
                    a.friends.contains(&b.id),
                    a.is_mutual_with(b),
                    "friends of {} disagree with follows of {}", a.id, b.id
                );
            }
        }
    }

    /// Property: the final state depends only on the sequence of client writes
    #[test]
    fn same_steps_converge_to_same_state(steps in prop::collection::vec(step_strategy(), 1..20)) {
        let (first, second) = block_on(async {
            let first = apply(&steps).await;
            let second = apply(&steps).await;
            (first, second)
        });

        for (a, b) in first.iter().zip(&second) {
            prop_assert_eq!(&a.friends, &b.friends);
            prop_assert_eq!(&a.following, &b.following);
        }
    }
}
