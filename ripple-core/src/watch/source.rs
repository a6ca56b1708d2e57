//! Watch sources.
//!
//! A source is classified once, when the watcher is registered, and turned
//! into a single getter.

use std::fmt;
use std::rc::Rc;

use super::traverse::traverse;
use crate::error::ReactiveError;
use crate::reactive::{Computed, Object, Reactive, Ref, Value};

/// A getter producing the watched value.
pub type Getter = Rc<dyn Fn() -> Value>;

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    /// A ref; the watched value is its content.
    Ref(Ref<Value>),
    /// A reactive container; always watched deeply.
    Container(Reactive),
    /// Several sources; the watched value is an array of their values.
    Multi(Vec<WatchSource>),
    /// An arbitrary tracked getter.
    Getter(Getter),
    /// Anything else. Watched as a constant, with a warning.
    Invalid(String),
}

impl WatchSource {
    /// Watch the result of `f`.
    pub fn getter(f: impl Fn() -> Value + 'static) -> Self {
        WatchSource::Getter(Rc::new(f))
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, WatchSource::Invalid(_))
    }

    pub(crate) fn resolve(self) -> ResolvedSource {
        match self {
            WatchSource::Ref(r) => ResolvedSource::single(Rc::new(move || r.get()), false),
            WatchSource::Container(container) => {
                ResolvedSource::single(Rc::new(move || container.to_value()), true)
            }
            WatchSource::Getter(getter) => ResolvedSource::single(getter, false),
            WatchSource::Invalid(description) => {
                warn_invalid(&description);
                ResolvedSource::single(Rc::new(|| Value::Undefined), false)
            }
            WatchSource::Multi(sources) => {
                let slots: Vec<Getter> = sources.into_iter().map(slot_getter).collect();
                ResolvedSource {
                    getter: Rc::new(move || {
                        Value::Object(Object::array(slots.iter().map(|slot| slot())))
                    }),
                    multi: true,
                    force_deep: false,
                }
            }
        }
    }
}

/// One entry of a multi-source.
fn slot_getter(source: WatchSource) -> Getter {
    match source {
        WatchSource::Ref(r) => Rc::new(move || r.get()),
        WatchSource::Container(container) => Rc::new(move || {
            let value = container.to_value();
            traverse(&value);
            value
        }),
        WatchSource::Getter(getter) => getter,
        WatchSource::Multi(_) => {
            warn_invalid("nested source list");
            Rc::new(|| Value::Undefined)
        }
        WatchSource::Invalid(description) => {
            warn_invalid(&description);
            Rc::new(|| Value::Undefined)
        }
    }
}

fn warn_invalid(description: &str) {
    let err = ReactiveError::InvalidSource(description.to_string());
    tracing::warn!(
        "{err}; a watch source can only be a ref, a reactive container, a getter or a list of these"
    );
}

/// A classified source.
pub(crate) struct ResolvedSource {
    pub(crate) getter: Getter,
    pub(crate) multi: bool,
    pub(crate) force_deep: bool,
}

impl ResolvedSource {
    fn single(getter: Getter, force_deep: bool) -> Self {
        Self {
            getter,
            multi: false,
            force_deep,
        }
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Ref(r) => f.debug_tuple("Ref").field(r).finish(),
            WatchSource::Container(c) => f.debug_tuple("Container").field(c).finish(),
            WatchSource::Multi(sources) => f.debug_tuple("Multi").field(sources).finish(),
            WatchSource::Getter(_) => f.write_str("Getter(..)"),
            WatchSource::Invalid(d) => f.debug_tuple("Invalid").field(d).finish(),
        }
    }
}

impl From<Ref<Value>> for WatchSource {
    fn from(r: Ref<Value>) -> Self {
        WatchSource::Ref(r)
    }
}

impl From<Reactive> for WatchSource {
    fn from(container: Reactive) -> Self {
        if container.is_reactive() {
            WatchSource::Container(container)
        } else {
            WatchSource::Invalid(format!("untracked object {:?}", container.to_raw()))
        }
    }
}

impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        match value {
            Value::Ref(r) => WatchSource::Ref(r),
            Value::Object(object) => match Reactive::existing(&object) {
                Some(container) => WatchSource::Container(container),
                None => WatchSource::Invalid(format!("untracked object {object:?}")),
            },
            other => WatchSource::Invalid(other.describe()),
        }
    }
}

impl<T> From<Computed<T>> for WatchSource
where
    T: Clone + Into<Value> + 'static,
{
    fn from(cell: Computed<T>) -> Self {
        WatchSource::getter(move || cell.get().into())
    }
}

impl<T: Into<WatchSource>> From<Vec<T>> for WatchSource {
    fn from(sources: Vec<T>) -> Self {
        WatchSource::Multi(sources.into_iter().map(Into::into).collect())
    }
}

macro_rules! typed_ref_source {
    ($($ty:ty),*) => {
        $(
            impl From<Ref<$ty>> for WatchSource {
                fn from(r: Ref<$ty>) -> Self {
                    WatchSource::getter(move || Value::from(r.get()))
                }
            }
        )*
    };
}

typed_ref_source!(bool, i32, i64, f64, String);
