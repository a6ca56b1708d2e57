//! Deep traversal.
//!
//! Reads every property reachable from a value so the active context
//! subscribes to all of them. The result is discarded.
//!
//! Nodes are marked visited on first encounter, which makes cyclic graphs
//! terminate. Raw objects are skipped with everything beneath them.

use std::collections::HashSet;

use crate::reactive::{DepId, Object, ObjectId, Reactive, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    Object(ObjectId),
    Ref(DepId),
}

/// Touch everything reachable from `value`.
///
/// Walks with an explicit worklist, so nesting depth is bounded by memory
/// rather than by the call stack.
pub(crate) fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    let mut pending = vec![value.clone()];

    while let Some(value) = pending.pop() {
        match value {
            Value::Ref(r) => {
                if seen.insert(Node::Ref(r.dep().id())) {
                    pending.push(r.get());
                }
            }
            Value::Object(object) => {
                if object.is_raw() || !seen.insert(Node::Object(object.id())) {
                    continue;
                }
                let start = pending.len();
                children(&object, &mut pending);
                // Keep document order: first child is popped first.
                pending[start..].reverse();
            }
            _ => {}
        }
    }
}

fn children(object: &Object, pending: &mut Vec<Value>) {
    match Reactive::existing(object) {
        Some(container) => {
            for key in container.keys() {
                if let Some(child) = container.get(key) {
                    pending.push(child);
                }
            }
        }
        // Unobserved targets (maps, sets, raw-view children) have nothing
        // to track themselves, but may hold refs or observed objects.
        None => pending.extend(object.values()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{mark_raw, reactive, Listener, ReactiveContext, Ref};
    use std::rc::Rc;

    fn dependencies_of(value: &Value) -> usize {
        let ctx = ReactiveContext::enter(Rc::new(Listener::new(|| {})));
        traverse(value);
        ctx.finish().len()
    }

    #[test]
    fn self_referential_graph_terminates() {
        let target = Object::new();
        target.insert("self", target.clone());
        let state = reactive(&target);

        // Structure plus the `self` key.
        assert_eq!(dependencies_of(&state.to_value()), 2);
    }

    #[test]
    fn nested_objects_and_refs_are_tracked() {
        let inner = Object::from_entries([("leaf", Value::from(1))]);
        let counter = Ref::new(Value::from(0));
        let target = Object::from_entries([
            ("inner", Value::from(inner)),
            ("counter", Value::from(counter.clone())),
        ]);
        let state = reactive(&target);

        // Reading `counter` through the container unwraps and tracks the ref.
        let ctx = ReactiveContext::enter(Rc::new(Listener::new(|| {})));
        traverse(&state.to_value());
        let deps = ctx.finish();
        assert!(deps.iter().any(|dep| dep.ptr_eq(counter.dep())));
        // outer structure, two keys, inner structure, `leaf`, the ref.
        assert_eq!(deps.len(), 6);
    }

    #[test]
    fn raw_subtrees_are_skipped() {
        let hidden = mark_raw(&Object::from_entries([("x", Value::from(1))]));
        let target = Object::from_entries([("hidden", Value::from(hidden))]);
        let state = reactive(&target);

        // Structure plus the `hidden` key; nothing beneath it.
        assert_eq!(dependencies_of(&state.to_value()), 2);
    }

    #[test]
    fn sets_and_maps_are_walked_for_their_contents() {
        let counter = Ref::new(Value::from(0));
        let set = Object::set();
        set.push(counter.clone());

        assert_eq!(dependencies_of(&Value::from(set)), 1);
    }

    #[test]
    fn very_deep_chains_do_not_exhaust_the_stack() {
        let root = Object::new();
        let mut tail = root.clone();
        for _ in 0..100_000 {
            let next = Object::new();
            tail.insert("next", next.clone());
            tail = next;
        }
        let state = reactive(&root);

        // Structure plus `next` for every link, then the leaf's structure.
        assert_eq!(dependencies_of(&state.to_value()), 200_001);
    }
}
