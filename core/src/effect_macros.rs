//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when creating `Effect` variants, particularly
//! for delayed and debounced actions.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use cart_sync_core::async_effect;
///
/// async_effect! {
///     let outcome = documents.write(&key, document).await;
///     Some(CartAction::WriteFinished { ok: outcome.is_ok() })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use cart_sync_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(30),
///     action: CartAction::TimeoutExpired
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

/// Create a debounced delay: a cancellable `Effect::Delay` keyed by `id`
///
/// Every time the reducer returns this effect the previous delay with the same
/// id is cancelled, so the action only fires after `duration` of quiet.
///
/// # Example
///
/// ```rust,ignore
/// use cart_sync_core::debounce;
/// use std::time::Duration;
///
/// debounce! {
///     id: WRITE_BACK,
///     duration: Duration::from_millis(800),
///     action: CartAction::WriteBackDue { generation }
/// }
/// ```
#[macro_export]
macro_rules! debounce {
    (
        id: $id:expr,
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Cancellable {
            id: $id,
            effect: ::std::boxed::Box::new($crate::delay! {
                duration: $duration,
                action: $action
            }),
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::{Effect, EffectId};
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        AsyncResult { value: i32 },
        TimeoutExpired,
    }

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::AsyncResult { value: 42 })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[test]
    fn test_async_effect_resolves_to_action() {
        let effect = async_effect! {
            Some(TestAction::AsyncResult { value: 7 })
        };

        let Effect::Future(fut) = effect else {
            unreachable!("async_effect! builds Effect::Future");
        };
        let action = tokio_test::block_on(fut);
        assert_eq!(action, Some(TestAction::AsyncResult { value: 7 }));
    }

    #[test]
    fn test_delay_macro() {
        let effect = delay! {
            duration: Duration::from_secs(30),
            action: TestAction::TimeoutExpired
        };

        assert!(matches!(effect, Effect::Delay { .. }));
    }

    #[test]
    fn test_debounce_macro_wraps_delay() {
        let effect = debounce! {
            id: EffectId::from_static("save"),
            duration: Duration::from_millis(800),
            action: TestAction::TimeoutExpired
        };

        match effect {
            Effect::Cancellable { id, effect } => {
                assert_eq!(id.as_str(), "save");
                assert!(matches!(
                    *effect,
                    Effect::Delay { duration, .. } if duration == Duration::from_millis(800)
                ));
            },
            other => unreachable!("expected cancellable delay, got {other:?}"),
        }
    }
}
