//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when creating `Effect` variants that wrap
//! async work, delays and cancellable registrations.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use helpdesk_core::async_effect;
///
/// async_effect! {
///     let doc = store.get_document("orders", &id).await;
///     Some(DetailAction::Loaded { doc })
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
/// use helpdesk_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(3),
///     action: DetailAction::DismissNotice
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

/// Create an `Effect::Cancellable` registered under an id
///
/// # Example
///
/// ```rust,ignore
/// use helpdesk_core::cancellable;
///
/// cancellable! {
///     id: "orders-list",
///     effect: Effect::Stream(snapshots)
/// }
/// ```
#[macro_export]
macro_rules! cancellable {
    (
        id: $id:expr,
        effect: $effect:expr
    ) => {
        $crate::effect::Effect::Cancellable {
            id: $crate::effect::EffectId::from($id),
            effect: ::std::boxed::Box::new($effect),
        }
    };
}
