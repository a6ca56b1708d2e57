//! Integration Tests for Reactive System
//!
//! These tests verify that refs, containers, computed cells, watchers and
//! scopes work together correctly.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use ripple_core::{
    computed, effect_scope, mark_raw, on_scope_dispose, reactive, shallow_reactive, watch,
    watch_effect, writable_computed, EffectScope, FlushMode, Host, LocalHost, Object, OnCleanup,
    ReactiveError, Ref, Runtime, StopHandle, Value, WatchOptions, WatchSource, REF_KEY,
};

type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

fn recording() -> (Calls, impl FnMut(&Value, &Value, &OnCleanup) + 'static) {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    let sink = calls.clone();
    let callback = move |new: &Value, old: &Value, _: &OnCleanup| {
        sink.borrow_mut().push((new.clone(), old.clone()));
    };
    (calls, callback)
}

fn hosted() -> (Rc<LocalHost>, EffectScope) {
    let host = LocalHost::new();
    let scope = EffectScope::with_host(host.clone(), false);
    (host, scope)
}

// ----------------------------------------------------------------------------
// Refs and computed cells
// ----------------------------------------------------------------------------

/// Test that a change notifies once and an equal write is silent.
#[test]
fn ref_write_notifies_once_per_change() {
    let count = Ref::new(0);
    let runs = Rc::new(Cell::new(0));

    let (source, r) = (count.clone(), runs.clone());
    watch_effect(
        move |_| {
            source.get();
            r.set(r.get() + 1);
        },
        WatchOptions::default(),
    );
    assert_eq!(runs.get(), 1);

    count.set(7);
    assert_eq!(count.get(), 7);
    assert_eq!(runs.get(), 2);

    count.set(7);
    assert_eq!(runs.get(), 2);
}

/// Test that computed cells cache between reads.
#[test]
fn computed_getter_runs_at_most_once_between_mutations() {
    let base = Ref::new(2);
    let evaluations = Rc::new(Cell::new(0));

    let (b, e) = (base.clone(), evaluations.clone());
    let squared = computed(move || {
        e.set(e.get() + 1);
        b.get() * b.get()
    });

    assert_eq!(squared.get(), 4);
    assert_eq!(squared.get(), 4);
    assert_eq!(evaluations.get(), 1);

    base.set(3);
    assert_eq!(squared.get(), 9);
    assert_eq!(squared.get(), 9);
    assert_eq!(evaluations.get(), 2);
}

/// Test that watchers see through chains of computed cells.
#[test]
fn watcher_observes_computed_chain() {
    let base = Ref::new(1);
    let b = base.clone();
    let doubled = computed(move || b.get() * 2);
    let d = doubled.clone();
    let plus_one = computed(move || d.get() + 1);

    let (calls, callback) = recording();
    watch(plus_one.clone(), callback, WatchOptions::default());

    base.set(5);
    assert_eq!(*calls.borrow(), vec![(Value::from(11), Value::from(3))]);
}

/// Test that writable computed cells round-trip through their source.
#[test]
fn writable_computed_round_trip() {
    let celsius = Ref::new(0.0_f64);
    let (get, set) = (celsius.clone(), celsius.clone());
    let fahrenheit = writable_computed(
        move || get.get() * 9.0 / 5.0 + 32.0,
        move |f: f64| {
            set.set((f - 32.0) * 5.0 / 9.0);
        },
    );

    assert_eq!(fahrenheit.get(), 32.0);
    fahrenheit.set(212.0).unwrap();
    assert_eq!(celsius.get(), 100.0);

    let readonly = computed(|| 1);
    assert_eq!(readonly.set(2), Err(ReactiveError::ReadOnly));
}

// ----------------------------------------------------------------------------
// Reactive containers
// ----------------------------------------------------------------------------

/// Test that wrapping twice yields the same tracked target.
#[test]
fn wrapping_is_idempotent() {
    let target = Object::from_entries([("n", 1)]);
    let first = reactive(&target);
    let second = reactive(&target);
    assert!(first.ptr_eq(&second));

    let runs = Rc::new(Cell::new(0));
    let (view, r) = (first.clone(), runs.clone());
    watch_effect(
        move |_| {
            view.get("n");
            r.set(r.get() + 1);
        },
        WatchOptions::default(),
    );

    second.set("n", 2);
    assert_eq!(runs.get(), 2);
}

/// Test that stored refs are unwrapped on read and written through on
/// assignment, except under the reserved key.
#[test]
fn stored_refs_unwrap_and_write_through() {
    let inner = Ref::new(Value::from(1));
    let target = Object::from_entries([
        ("count", Value::from(inner.clone())),
        (REF_KEY, Value::from(inner.clone())),
    ]);
    let state = reactive(&target);

    assert_eq!(state.get("count"), Some(Value::from(1)));
    assert!(matches!(state.get(REF_KEY), Some(Value::Ref(_))));

    state.set("count", 5);
    assert_eq!(inner.get(), Value::from(5));
    // The slot still holds the ref.
    assert!(matches!(target.get("count"), Some(Value::Ref(_))));
}

/// Test that nested objects become tracked lazily and raw ones never do.
#[test]
fn nested_objects_are_tracked_unless_raw() {
    let profile = Object::from_entries([("name", "ada")]);
    let settings = mark_raw(&Object::from_entries([("theme", "dark")]));
    let state = reactive(&Object::from_entries([
        ("profile", Value::from(profile)),
        ("settings", Value::from(settings)),
    ]));

    let runs = Rc::new(Cell::new(0));
    let (view, r) = (state.clone(), runs.clone());
    watch_effect(
        move |_| {
            view.child("profile").and_then(|p| p.get("name"));
            view.child("settings").and_then(|s| s.get("theme"));
            r.set(r.get() + 1);
        },
        WatchOptions::default(),
    );

    state.child("profile").unwrap().set("name", "grace");
    assert_eq!(runs.get(), 2);

    state.child("settings").unwrap().set("theme", "light");
    assert_eq!(runs.get(), 2);
}

/// Test that shallow containers do not track nested properties.
#[test]
fn shallow_container_tracks_top_level_only() {
    let nested = Object::from_entries([("x", 1)]);
    let state = shallow_reactive(&Object::from_entries([("nested", Value::from(nested))]));

    let runs = Rc::new(Cell::new(0));
    let (view, r) = (state.clone(), runs.clone());
    watch_effect(
        move |_| {
            view.child("nested").and_then(|n| n.get("x"));
            r.set(r.get() + 1);
        },
        WatchOptions::default(),
    );

    state.child("nested").unwrap().set("x", 2);
    assert_eq!(runs.get(), 1);

    state.set("nested", Object::from_entries([("x", 3)]));
    assert_eq!(runs.get(), 2);
}

/// Test that adding and removing keys notifies key-set readers.
#[test]
fn structure_changes_notify_key_readers() {
    let state = reactive(&Object::new());
    let sizes = Rc::new(RefCell::new(Vec::new()));

    let (view, sink) = (state.clone(), sizes.clone());
    watch_effect(move |_| sink.borrow_mut().push(view.len()), WatchOptions::default());

    state.set("a", 1);
    state.set("a", 2);
    state.remove("a");
    assert_eq!(*sizes.borrow(), vec![0, 1, 0]);
}

// ----------------------------------------------------------------------------
// Watchers under a host
// ----------------------------------------------------------------------------

/// Test that a pre-flush watcher fires once per tick with new and old values.
#[test]
fn watch_ref_fires_after_flush() {
    let (host, scope) = hosted();
    let count = Ref::new(Value::from(0));
    let (calls, callback) = recording();

    scope.run(|| watch(count.clone(), callback, WatchOptions::default()));

    count.set(1.into());
    assert!(calls.borrow().is_empty());

    host.tick();
    assert_eq!(*calls.borrow(), vec![(Value::from(1), Value::from(0))]);
}

/// Test that an immediate watcher calls back synchronously at registration.
#[test]
fn immediate_watch_fires_at_registration() {
    let (_host, scope) = hosted();
    let count = Ref::new(Value::from(0));
    let (calls, callback) = recording();

    scope.run(|| watch(count.clone(), callback, WatchOptions::default().immediate()));
    assert_eq!(*calls.borrow(), vec![(Value::from(0), Value::Undefined)]);
}

/// Test that several writes in one tick produce one callback.
#[test]
fn writes_within_a_tick_are_batched() {
    let (host, scope) = hosted();
    let count = Ref::new(Value::from(0));
    let (calls, callback) = recording();

    scope.run(|| watch(count.clone(), callback, WatchOptions::default()));

    count.set(1.into());
    count.set(2.into());
    count.set(3.into());
    host.tick();
    assert_eq!(*calls.borrow(), vec![(Value::from(3), Value::from(0))]);
}

/// Test that a multi-source watcher reports every slot and skips no-ops.
#[test]
fn multi_source_watch_reports_full_arrays() {
    let (host, scope) = hosted();
    let a = Ref::new(Value::from(1));
    let b = Ref::new(Value::from(2));
    let (calls, callback) = recording();

    scope.run(|| watch(vec![a.clone(), b.clone()], callback, WatchOptions::default()));

    a.set(10.into());
    host.tick();
    {
        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.to_vec(), Some(vec![Value::from(10), Value::from(2)]));
        assert_eq!(calls[0].1.to_vec(), Some(vec![Value::from(1), Value::from(2)]));
    }

    // Changed and changed back before the flush.
    a.set(11.into());
    a.set(10.into());
    host.tick();
    assert_eq!(calls.borrow().len(), 1);
}

/// Test the effect-watch log example: initial run, then one run per flush.
#[test]
fn watch_effect_logs_each_flush() {
    let (host, scope) = hosted();
    let count = Ref::new(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let (source, sink) = (count.clone(), log.clone());
    scope.run(|| {
        watch_effect(move |_| sink.borrow_mut().push(source.get()), WatchOptions::default())
    });

    count.set(1);
    host.tick();
    assert_eq!(*log.borrow(), vec![0, 1]);
}

/// Test that deep watching a self-referential object terminates.
#[test]
fn deep_watch_on_cyclic_object_terminates() {
    let (host, scope) = hosted();
    let target = Object::new();
    target.insert("self", target.clone());
    let state = reactive(&target);
    let (calls, callback) = recording();

    let view = state.clone();
    scope.run(|| {
        watch(
            WatchSource::getter(move || view.to_value()),
            callback,
            WatchOptions::default().deep(),
        )
    });

    state.set("tag", "x");
    host.tick();
    assert_eq!(calls.borrow().len(), 1);
}

/// Test that cleanups from the previous callback run before the next one.
#[test]
fn cleanup_precedes_next_callback() {
    let (host, scope) = hosted();
    let count = Ref::new(Value::from(0));
    let log = Rc::new(RefCell::new(Vec::new()));

    let sink = log.clone();
    let handle = scope
        .run(|| {
            watch(
                count.clone(),
                move |new, _, on_cleanup| {
                    let n = new.as_int().unwrap_or_default();
                    sink.borrow_mut().push(format!("call {n}"));
                    let sink = sink.clone();
                    on_cleanup.register(move || sink.borrow_mut().push(format!("cleanup {n}")));
                },
                WatchOptions::default(),
            )
        })
        .unwrap();

    count.set(1.into());
    host.tick();
    count.set(2.into());
    host.tick();
    handle.stop();

    assert_eq!(
        *log.borrow(),
        vec!["call 1", "cleanup 1", "call 2", "cleanup 2"]
    );
}

// ----------------------------------------------------------------------------
// Effect scopes
// ----------------------------------------------------------------------------

/// Test that stopping a scope twice runs its cleanups once and that a
/// stopped scope refuses to run.
#[test]
fn scope_stop_is_idempotent() {
    let scope = effect_scope(false);
    let cleanups = Rc::new(Cell::new(0));

    let c = cleanups.clone();
    scope.run(|| on_scope_dispose(move || c.set(c.get() + 1)).unwrap());

    scope.stop();
    scope.stop();
    assert_eq!(cleanups.get(), 1);

    let ran = Rc::new(Cell::new(false));
    let r = ran.clone();
    assert_eq!(scope.run(move || r.set(true)), None);
    assert!(!ran.get());
}

/// Test that stopping a scope stops the watchers and computed cells created
/// in it.
#[test]
fn scope_stop_tears_down_owned_watchers() {
    let count = Ref::new(Value::from(0));
    let (calls, callback) = recording();
    let scope = effect_scope(false);

    let (handle, cell) = scope
        .run(|| {
            let source = count.clone();
            (
                watch(count.clone(), callback, WatchOptions::default().flush(FlushMode::Sync)),
                computed(move || source.get()),
            )
        })
        .unwrap();
    assert_eq!(cell.get(), Value::from(0));
    assert_eq!(scope.owned_count(), 2);

    scope.stop();
    assert!(handle.is_stopped());
    assert_eq!(count.subscriber_count(), 0);

    count.set(1.into());
    assert!(calls.borrow().is_empty());
}

/// Test that stopping a hosted scope drops its pending flushes.
#[test]
fn stopped_scope_drops_pending_jobs() {
    let (host, scope) = hosted();
    let count = Ref::new(Value::from(0));
    let (calls, callback) = recording();

    scope.run(|| watch(count.clone(), callback, WatchOptions::default()));
    count.set(1.into());

    scope.stop();
    assert!(host.is_destroyed());
    host.tick();
    assert!(calls.borrow().is_empty());
}

/// Test that watchers stopped through their handles are not kept by their
/// scope.
#[test]
fn watchers_stopped_by_handle_leave_their_scope() {
    let scope = effect_scope(false);
    let count = Ref::new(0_i64);

    scope.run(|| {
        for _ in 0..1000 {
            let source = count.clone();
            watch_effect(
                move |_| {
                    source.get();
                },
                WatchOptions::default(),
            )
            .stop();
        }
    });

    assert_eq!(scope.owned_count(), 0);
    assert_eq!(count.subscriber_count(), 0);
}

// ----------------------------------------------------------------------------
// Deep graphs
// ----------------------------------------------------------------------------

/// Test that a deep watch over a very deep chain registers the leaf.
#[test]
fn deep_watch_reaches_the_end_of_a_long_chain() {
    let root = Object::new();
    let mut leaf = root.clone();
    for _ in 0..100_000 {
        let next = Object::new();
        leaf.insert("next", next.clone());
        leaf = next;
    }
    let state = reactive(&root);
    let (calls, callback) = recording();

    let handle = watch(state, callback, WatchOptions::default());
    reactive(&leaf).set("done", true);
    assert_eq!(calls.borrow().len(), 1);
    handle.stop();
}

// ----------------------------------------------------------------------------
// Panics and self-stopping watchers
// ----------------------------------------------------------------------------

/// Test that a panicking getter reaches the writer and the watcher keeps
/// working afterwards.
#[test]
fn getter_panic_propagates_and_watcher_recovers() {
    let count = Ref::new(0_i64);
    let (calls, callback) = recording();

    let source = count.clone();
    watch(
        WatchSource::getter(move || {
            let v = source.get();
            if v == 1 {
                panic!("getter failed");
            }
            Value::from(v)
        }),
        callback,
        WatchOptions::default(),
    );

    assert!(catch_unwind(AssertUnwindSafe(|| count.set(1))).is_err());
    assert!(!Runtime::is_tracking());

    count.set(2);
    assert_eq!(*calls.borrow(), vec![(Value::from(2), Value::from(0))]);
}

/// Test that a panicking callback reaches the writer and the next change is
/// still delivered, with the panicking value as the previous one.
#[test]
fn callback_panic_propagates_and_watcher_recovers() {
    let count = Ref::new(0_i64);
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));

    let sink = calls.clone();
    watch(
        count.clone(),
        move |new, old, _| {
            if *new == Value::from(1) {
                panic!("callback failed");
            }
            sink.borrow_mut().push((new.clone(), old.clone()));
        },
        WatchOptions::default(),
    );

    assert!(catch_unwind(AssertUnwindSafe(|| count.set(1))).is_err());
    count.set(2);
    assert_eq!(*calls.borrow(), vec![(Value::from(2), Value::from(1))]);
}

/// Test that a watcher can stop itself from inside its callback.
#[test]
fn watcher_stops_itself_from_its_callback() {
    let count = Ref::new(0_i64);
    let own_handle: Rc<RefCell<Option<StopHandle>>> = Rc::new(RefCell::new(None));
    let calls = Rc::new(Cell::new(0));
    let cleanups = Rc::new(Cell::new(0));

    let (slot, c, cl) = (own_handle.clone(), calls.clone(), cleanups.clone());
    let handle = watch(
        count.clone(),
        move |_, _, on_cleanup| {
            c.set(c.get() + 1);
            let cl = cl.clone();
            on_cleanup.register(move || cl.set(cl.get() + 1));
            if let Some(handle) = slot.borrow().as_ref() {
                handle.stop();
            }
        },
        WatchOptions::default(),
    );
    *own_handle.borrow_mut() = Some(handle.clone());

    count.set(1);
    assert!(handle.is_stopped());
    assert_eq!(cleanups.get(), 1);
    assert_eq!(count.subscriber_count(), 0);

    count.set(2);
    assert_eq!(calls.get(), 1);
    own_handle.borrow_mut().take();
}

/// Test that an effect watcher can stop itself mid-run without keeping the
/// subscriptions of that run.
#[test]
fn effect_watcher_stops_itself_mid_run() {
    let count = Ref::new(0_i64);
    let own_handle: Rc<RefCell<Option<StopHandle>>> = Rc::new(RefCell::new(None));
    let runs = Rc::new(Cell::new(0));

    let (slot, source, r) = (own_handle.clone(), count.clone(), runs.clone());
    let handle = watch_effect(
        move |_| {
            r.set(r.get() + 1);
            if source.get() == 1 {
                if let Some(handle) = slot.borrow().as_ref() {
                    handle.stop();
                }
            }
        },
        WatchOptions::default(),
    );
    *own_handle.borrow_mut() = Some(handle.clone());

    count.set(1);
    assert!(handle.is_stopped());
    assert_eq!(count.subscriber_count(), 0);

    count.set(2);
    assert_eq!(runs.get(), 2);
    own_handle.borrow_mut().take();
}
