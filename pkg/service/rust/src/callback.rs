// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Named out-of-band operations.
//!
//! Every handler has the generic shape `(Vec<Value>) -> Result<Value, _>`.
//! Strongly typed functions are adapted through [`TypedCallback`], which checks
//! the argument count before converting anything and fails the whole call on
//! a mismatch.

use crate::value::{FromValue, Value};
use log::debug;
use std::collections::HashMap;
use thiserror::Error;

pub type Callback = Box<dyn Fn(Vec<Value>) -> Result<Value, CallbackError>>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallbackError {
    #[error("unknown callback '{0}'")]
    Unknown(String),

    #[error("expected {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("argument {index}: expected {expected}, got {actual}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{0}")]
    Failed(String),

    #[error("event loop is not running")]
    Unavailable,
}

impl CallbackError {
    /// Unknown kinds are a normal "no effect" outcome rather than a failure.
    pub fn is_unknown(&self) -> bool {
        matches!(self, CallbackError::Unknown(_))
    }
}

#[derive(Default)]
pub struct CallbackRegistry {
    handlers: HashMap<String, Callback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `kind`. An existing handler for the same kind
    /// is replaced.
    pub fn add<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, CallbackError> + 'static,
    {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), Box::new(handler)).is_some() {
            debug!("callback '{kind}' replaced");
        } else {
            debug!("callback '{kind}' registered");
        }
    }

    /// Register a strongly typed function; arguments are matched by position.
    pub fn add_typed<F, Args>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: TypedCallback<Args>,
    {
        let kind = kind.into();
        let callback = handler.into_callback();
        if self.handlers.insert(kind.clone(), callback).is_some() {
            debug!("callback '{kind}' replaced");
        } else {
            debug!("callback '{kind}' registered");
        }
    }

    pub fn invoke(&self, kind: &str, args: Vec<Value>) -> Result<Value, CallbackError> {
        match self.handlers.get(kind) {
            Some(handler) => handler(args),
            None => Err(CallbackError::Unknown(kind.to_string())),
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

/// A function that can be wrapped into the generic callback shape.
/// `Args` is the tuple of parameter types and only drives impl selection.
pub trait TypedCallback<Args>: 'static {
    fn into_callback(self) -> Callback;
}

type ArgIter = std::iter::Enumerate<std::vec::IntoIter<Value>>;

fn take_arg<T: FromValue>(args: &mut ArgIter, expected: usize) -> Result<T, CallbackError> {
    let (index, value) = args.next().ok_or(CallbackError::ArgumentCount {
        expected,
        actual: 0,
    })?;
    let actual = value.type_name();
    T::from_value(value).ok_or(CallbackError::ArgumentType {
        index,
        expected: T::TYPE_NAME,
        actual,
    })
}

macro_rules! impl_typed_callback {
    ($count:expr; $($arg:ident),*) => {
        impl<F, R, $($arg,)*> TypedCallback<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            R: Into<Value>,
            $($arg: FromValue,)*
        {
            fn into_callback(self) -> Callback {
                Box::new(move |args: Vec<Value>| {
                    if args.len() != $count {
                        return Err(CallbackError::ArgumentCount {
                            expected: $count,
                            actual: args.len(),
                        });
                    }
                    #[allow(unused_mut, unused_variables)]
                    let mut args = args.into_iter().enumerate();
                    Ok((self)($(take_arg::<$arg>(&mut args, $count)?),*).into())
                })
            }
        }
    };
}

impl_typed_callback!(0;);
impl_typed_callback!(1; A);
impl_typed_callback!(2; A, B);
impl_typed_callback!(3; A, B, C);
impl_typed_callback!(4; A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_last_registration_wins() {
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let mut registry = CallbackRegistry::new();

        let f = Rc::clone(&first);
        registry.add("x", move |_| {
            f.set(f.get() + 1);
            Ok(Value::from("h1"))
        });
        let s = Rc::clone(&second);
        registry.add("x", move |_| {
            s.set(s.get() + 1);
            Ok(Value::from("h2"))
        });

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.invoke("x", vec![]).unwrap(), Value::from("h2"));
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn test_unknown_kind_is_not_fatal() {
        let registry = CallbackRegistry::new();
        let err = registry.invoke("unknown", vec![]).unwrap_err();
        assert!(err.is_unknown());
        assert_eq!(err.to_string(), "unknown callback 'unknown'");
    }

    #[test]
    fn test_kinds_are_case_sensitive() {
        let mut registry = CallbackRegistry::new();
        registry.add("Echo", |args| Ok(Value::List(args)));
        assert!(registry.contains("Echo"));
        assert!(registry.invoke("echo", vec![]).unwrap_err().is_unknown());
    }

    #[test]
    fn test_typed_callback_converts_by_position() {
        let mut registry = CallbackRegistry::new();
        registry.add_typed("add", |a: i64, b: i64| a + b);
        registry.add_typed("greet", |name: String, loud: bool| {
            if loud {
                format!("HELLO {}", name.to_uppercase())
            } else {
                format!("hello {name}")
            }
        });

        let sum = registry
            .invoke("add", vec![Value::Int(2), Value::Int(40)])
            .unwrap();
        assert_eq!(sum, Value::Int(42));

        let greeting = registry
            .invoke("greet", vec![Value::from("ada"), Value::Bool(true)])
            .unwrap();
        assert_eq!(greeting, Value::from("HELLO ADA"));
    }

    #[test]
    fn test_typed_callback_checks_count_first() {
        let called = Rc::new(Cell::new(false));
        let c = Rc::clone(&called);
        let mut registry = CallbackRegistry::new();
        registry.add_typed("pair", move |_a: i64, _b: i64| {
            c.set(true);
        });

        assert_eq!(
            registry.invoke("pair", vec![Value::Int(1)]),
            Err(CallbackError::ArgumentCount {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            registry.invoke("pair", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            Err(CallbackError::ArgumentCount {
                expected: 2,
                actual: 3
            })
        );
        assert!(!called.get());
    }

    #[test]
    fn test_typed_callback_type_mismatch() {
        let mut registry = CallbackRegistry::new();
        registry.add_typed("len", |s: String| s.len() as i64);

        assert_eq!(
            registry.invoke("len", vec![Value::Int(3)]),
            Err(CallbackError::ArgumentType {
                index: 0,
                expected: "string",
                actual: "int"
            })
        );
    }

    #[test]
    fn test_zero_arity_and_unit_result() {
        let mut registry = CallbackRegistry::new();
        registry.add_typed("ping", || "pong");
        registry.add_typed("noop", || {});

        assert_eq!(registry.invoke("ping", vec![]).unwrap(), Value::from("pong"));
        assert_eq!(registry.invoke("noop", vec![]).unwrap(), Value::Null);
        assert!(matches!(
            registry.invoke("ping", vec![Value::Null]),
            Err(CallbackError::ArgumentCount { .. })
        ));
    }

    #[test]
    fn test_handler_reported_failure() {
        let mut registry = CallbackRegistry::new();
        registry.add("fail", |_| Err(CallbackError::Failed("nope".into())));
        assert_eq!(
            registry.invoke("fail", vec![]),
            Err(CallbackError::Failed("nope".into()))
        );
        assert_eq!(registry.kinds(), vec!["fail"]);
    }
}
