//! Integration Tests for Reactive System
//!
//! These tests verify that signals, effects, memos, groups and links work
//! together correctly through the public API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use cascade_core::reactive::{
    batch, hibernate, link, link_with, Cleanup, Effect, EffectOptions, LinkOptions, LinkTarget,
    Memo, MemoOptions, Signal, SignalGroup,
};
use cascade_core::Error;

/// An effect drops dependencies it stopped reading and picks up new ones.
#[test]
fn dynamic_resubscription_follows_branches() {
    const SENTINEL: i32 = 7;

    let a = Signal::new(0);
    let b = Signal::new(0);
    let runs = Arc::new(AtomicI32::new(0));

    let (a_clone, b_clone, runs_clone) = (a.clone(), b.clone(), runs.clone());
    let effect = Effect::new(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        if a_clone.get() == SENTINEL {
            b_clone.get();
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // B is not a dependency yet
    b.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    a.set(SENTINEL);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(effect.dependencies(), vec![a.id(), b.id()]);

    b.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    // Leaving the branch drops B again
    a.set(0);
    b.set(3);
    assert_eq!(runs.load(Ordering::SeqCst), 4);
    assert_eq!(b.subscriber_count(), 0);
}

/// Two writes in one batch run a dependent effect once, with the final value.
#[test]
fn batch_runs_effect_once_with_final_value() {
    let a = Signal::new(0);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (a_clone, seen_clone) = (a.clone(), seen.clone());
    let _effect = Effect::new(move || seen_clone.lock().push(a_clone.get()));

    batch(|| {
        a.set(1);
        a.set(2);
    });

    assert_eq!(*seen.lock(), vec![0, 2]);
}

/// Effects triggered by one write run in descending priority order.
#[test]
fn priorities_order_effects_outside_batch() {
    let a = Signal::new(0);
    let c = Signal::new(0);
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut effects = Vec::new();
    for priority in [0, 1000, -100] {
        let (a_clone, c_clone, order_clone) = (a.clone(), c.clone(), order.clone());
        let effect = Effect::with_options(
            move || {
                let x = a_clone.get();
                order_clone.lock().push(priority);
                c_clone.set(x + priority);
            },
            EffectOptions::default().priority(priority),
        )
        .unwrap();
        effects.push(effect);
    }
    order.lock().clear();

    a.set(1);

    assert_eq!(*order.lock(), vec![1000, 0, -100]);
    // The last effect to run wins
    assert_eq!(c.get(), 1 - 100);
}

/// Destroying a parent runs every cleanup innermost first, each before the
/// effect releases its subscriptions.
#[test]
fn nested_lifecycle_cleans_up_innermost_first() {
    let signal = Signal::new(0);
    let log = Arc::new(Mutex::new(Vec::new()));

    let recorder = |name: &'static str, signal: Signal<i32>, log: Arc<Mutex<Vec<(&'static str, usize)>>>| {
        Cleanup::new(move || log.lock().push((name, signal.subscriber_count())))
    };

    let (signal_outer, log_outer) = (signal.clone(), log.clone());
    let parent = Effect::new(move || {
        signal_outer.get();

        let (signal_child, log_child) = (signal_outer.clone(), log_outer.clone());
        Effect::new(move || {
            signal_child.get();

            let (signal_grand, log_grand) = (signal_child.clone(), log_child.clone());
            Effect::new(move || {
                signal_grand.get();
                recorder("grandchild", signal_grand.clone(), log_grand.clone())
            });

            recorder("child", signal_child.clone(), log_child.clone())
        });

        recorder("parent", signal_outer.clone(), log_outer.clone())
    });
    assert_eq!(signal.subscriber_count(), 3);

    parent.destroy();

    assert_eq!(
        *log.lock(),
        vec![("grandchild", 3), ("child", 2), ("parent", 1)]
    );
    assert_eq!(signal.subscriber_count(), 0);
}

/// Re-running a parent replaces its children instead of reusing them.
#[test]
fn parent_rerun_recreates_children() {
    let trigger = Signal::new(0);
    let children = Arc::new(Mutex::new(Vec::new()));

    let (trigger_clone, children_clone) = (trigger.clone(), children.clone());
    let parent = Effect::new(move || {
        trigger_clone.get();
        children_clone.lock().push(Effect::new(|| {}));
    });

    trigger.set(1);

    let children = children.lock();
    assert_eq!(children.len(), 2);
    assert!(children[0].is_destroyed());
    assert!(!children[1].is_destroyed());
    assert_ne!(children[0].id(), children[1].id());
    assert_eq!(children[1].parent(), Some(parent.clone()));
    assert_eq!(parent.child_count(), 1);
}

/// A lazy memo recomputes once on read, however many times its input changed.
#[test]
fn lazy_memo_recomputes_once_on_read() {
    let input = Signal::new(0);
    let computations = Arc::new(AtomicI32::new(0));

    let (input_clone, computations_clone) = (input.clone(), computations.clone());
    let memo = Memo::lazy(move || {
        computations_clone.fetch_add(1, Ordering::SeqCst);
        input_clone.get() * 10
    });
    assert_eq!(computations.load(Ordering::SeqCst), 0);

    assert_eq!(memo.get(), 0);
    assert_eq!(computations.load(Ordering::SeqCst), 1);

    for value in 1..=5 {
        input.set(value);
    }
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert!(memo.is_stale());

    assert_eq!(memo.get(), 50);
    assert_eq!(computations.load(Ordering::SeqCst), 2);
}

/// Derived values settle before the effects that read them.
#[test]
fn memo_and_consumer_see_consistent_values() {
    let base = Signal::new(1);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let base_clone = base.clone();
    let doubled = Memo::new(move || base_clone.get() * 2);

    let (base_clone, doubled_clone, seen_clone) = (base.clone(), doubled.clone(), seen.clone());
    let _effect = Effect::new(move || {
        seen_clone.lock().push((base_clone.get(), doubled_clone.get()));
    });

    base.set(2);
    base.set(3);

    for (base, doubled) in seen.lock().iter() {
        assert_eq!(*doubled, base * 2);
    }
}

/// Groups own their members, resolve names through parents and clear once.
#[test]
fn group_hierarchy_owns_and_resolves() {
    let root = SignalGroup::new();
    let child = SignalGroup::new();
    root.attach_group(&child).unwrap();

    let theme = Signal::new(String::from("dark"));
    root.attach_signal_by_name("theme", &theme).unwrap();

    let total = Memo::with_options(
        || 42,
        MemoOptions::default().name("total").attach(&child),
    )
    .unwrap();

    assert_eq!(
        child.signal::<String>("theme").map(|s| s.get()),
        Some(String::from("dark"))
    );
    assert_eq!(child.signal::<i32>("total").map(|s| s.get()), Some(42));
    assert!(!root.has_signal("total"));

    let source = Signal::new(0);
    let target = Signal::new(0);
    let synced = link_with(&source, &target, LinkOptions::default().attach(&child)).unwrap();

    root.clear();

    assert!(child.is_destroyed());
    assert!(theme.is_destroyed());
    assert!(total.is_destroyed());
    assert!(synced.is_destroyed());
    assert!(!source.is_destroyed());

    assert_eq!(
        root.attach_signal(&Signal::new(0)),
        Err(Error::GroupDestroyed(root.id()))
    );
}

/// A link is a singleton per pair and `next_value` skips the retained value.
#[tokio::test]
async fn link_singleton_and_next_value() {
    let a = Signal::new(1);
    let writes = Arc::new(AtomicI32::new(0));
    let writes_clone = writes.clone();
    let b = LinkTarget::callback(move |_: i32| {
        writes_clone.fetch_add(1, Ordering::SeqCst);
    });

    let first = link(&a, b.clone());
    let second = link(&a, b);
    assert_eq!(first, second);
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    let next = first.next_value();
    a.set(2);
    a.set(3);
    assert_eq!(next.await, Ok(2));

    let next = first.next_value();
    a.set(4);
    assert_eq!(next.await, Ok(4));
}

/// Writes made while hibernating are not held back by an outer batch.
#[test]
fn hibernate_escapes_outer_batch() {
    let signal = Signal::new(0);
    let seen = Arc::new(AtomicI32::new(0));

    let (signal_clone, seen_clone) = (signal.clone(), seen.clone());
    let _effect = Effect::new(move || seen_clone.store(signal_clone.get(), Ordering::SeqCst));

    batch(|| {
        hibernate(|| signal.set(5));
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    });
}

/// An async effect's cleanup runs before the next run, or immediately if
/// it arrives after the effect is gone.
#[tokio::test]
async fn async_effect_installs_cleanup_when_resolved() {
    let signal = Signal::new(0);
    let cleanups = Arc::new(AtomicI32::new(0));
    let resolved = Arc::new(Notify::new());

    let (signal_clone, cleanups_clone, resolved_clone) =
        (signal.clone(), cleanups.clone(), resolved.clone());
    let effect = Effect::new_async(move || {
        signal_clone.get();
        let (cleanups, resolved) = (cleanups_clone.clone(), resolved_clone.clone());
        async move {
            tokio::task::yield_now().await;
            resolved.notify_one();
            Cleanup::new(move || {
                cleanups.fetch_add(1, Ordering::SeqCst);
            })
        }
    });
    assert_eq!(effect.dependencies(), vec![signal.id()]);

    resolved.notified().await;
    assert_eq!(cleanups.load(Ordering::SeqCst), 0);

    signal.set(1);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);

    effect.destroy();
    resolved.notified().await;
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
}

/// Signals read by a cleanup that runs inline inside another effect's write
/// do not become dependencies of the writer.
#[test]
fn cleanup_reads_do_not_leak_into_writer() {
    let a = Signal::new(0);
    let s = Signal::new(0);
    let x = Signal::new(0);

    let (s_clone, x_clone) = (s.clone(), x.clone());
    let _reader = Effect::new(move || {
        s_clone.get();
        let x = x_clone.clone();
        Cleanup::new(move || {
            x.get();
        })
    });

    let (a_clone, s_clone) = (a.clone(), s.clone());
    let writer = Effect::new(move || s_clone.set(a_clone.get()));

    a.set(1);
    assert_eq!(writer.dependencies(), vec![a.id()]);
    assert_eq!(writer.run_count(), 2);

    x.set(99);
    assert_eq!(writer.run_count(), 2);
}

/// Signals read by a cleanup run from `destroy` inside another effect are
/// not tracked either.
#[test]
fn destroy_cleanup_reads_do_not_leak_into_caller() {
    let trigger = Signal::new(0);
    let y = Signal::new(0);

    let y_clone = y.clone();
    let victim = Effect::new(move || {
        let y = y_clone.clone();
        Cleanup::new(move || {
            y.get();
        })
    });

    let (trigger_clone, victim_clone) = (trigger.clone(), victim.clone());
    let destroyer = Effect::new(move || {
        if trigger_clone.get() > 0 {
            victim_clone.destroy();
        }
    });

    trigger.set(1);
    assert!(victim.is_destroyed());
    assert_eq!(destroyer.dependencies(), vec![trigger.id()]);
    assert_eq!(y.subscriber_count(), 0);
}

/// Options naming a destroyed group fail with `GroupDestroyed` and leave
/// nothing subscribed behind.
#[test]
fn attach_to_destroyed_group_fails() {
    let group = SignalGroup::new();
    group.clear();
    let input = Signal::new(1);

    let input_clone = input.clone();
    let effect = Effect::with_options(
        move || {
            input_clone.get();
        },
        EffectOptions::default().depends_on(&input).attach(&group),
    );
    assert_eq!(effect.err(), Some(Error::GroupDestroyed(group.id())));
    assert_eq!(input.subscriber_count(), 0);

    let input_clone = input.clone();
    let memo = Memo::with_options(
        move || input_clone.get() * 2,
        MemoOptions::default().name("doubled").attach(&group),
    );
    assert_eq!(memo.err(), Some(Error::GroupDestroyed(group.id())));
    assert_eq!(input.subscriber_count(), 0);
}

/// A failed `link_with` destroys a link it created but leaves an existing
/// shared link alone.
#[test]
fn link_with_destroyed_group_keeps_existing_link() {
    let group = SignalGroup::new();
    group.clear();

    let source = Signal::new(1);
    let fresh_target = Signal::new(0);
    let failed = link_with(&source, &fresh_target, LinkOptions::default().attach(&group));
    assert_eq!(failed.err(), Some(Error::GroupDestroyed(group.id())));
    // The initial write happened, but the link is gone
    assert_eq!(fresh_target.get(), 1);
    source.set(2);
    assert_eq!(fresh_target.get(), 1);

    let shared_target = Signal::new(0);
    let shared = link(&source, &shared_target);
    let failed = link_with(&source, &shared_target, LinkOptions::default().attach(&group));
    assert_eq!(failed.err(), Some(Error::GroupDestroyed(group.id())));
    assert!(!shared.is_destroyed());

    source.set(3);
    assert_eq!(shared_target.get(), 3);
}
