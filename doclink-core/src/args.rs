//! Flexible call arguments for connection and accessor entry points.
//!
//! Every public operation takes its required parameters followed by a single
//! [`CallArgs`] value. A `CallArgs` carries an optional positional slot that may hold
//! either the operation's options or a completion callback, plus an optional trailing
//! callback. [`CallArgs::resolve`] collapses those shapes into one canonical
//! [`ResolvedArgs`]:
//!
//! - `(options, callback)` resolves as given
//! - `(callback)` alone resolves to default options and that callback
//! - `(options)` alone or nothing resolves with a no-op callback
//!
//! ```ignore
//! use doclink_core::{args::CallArgs, query::QueryOptions};
//!
//! // options only
//! events.get(doc! {}, QueryOptions::new().page_size(10)).await?;
//!
//! // callback in the options position
//! events.get(doc! {}, CallArgs::callback(|res| println!("{res:?}"))).await?;
//!
//! // both
//! events
//!     .get(doc! {}, CallArgs::options(QueryOptions::new().page_size(10)).with_callback(|res| {}))
//!     .await?;
//! ```

use std::fmt::{self, Debug};

use crate::{
    driver::UpdateOptions,
    error::{DocumentStoreError, DocumentStoreResult},
    query::QueryOptions,
    uri::ConnectOptions,
};

/// A completion callback receiving the operation result by reference.
pub type Callback<T> = Box<dyn FnOnce(&DocumentStoreResult<T>) + Send + 'static>;

/// The value occupying the positional slot that normally holds options.
pub enum Slot<O, T> {
    Options(O),
    Callback(Callback<T>),
}

/// Unresolved call arguments: an optional options-or-callback slot and an
/// optional trailing callback.
pub struct CallArgs<O, T> {
    slot: Option<Slot<O, T>>,
    callback: Option<Callback<T>>,
}

impl<O, T> CallArgs<O, T> {
    /// Arguments with neither options nor a callback.
    pub fn none() -> Self {
        Self { slot: None, callback: None }
    }

    /// Arguments carrying only options.
    pub fn options(options: O) -> Self {
        Self { slot: Some(Slot::Options(options)), callback: None }
    }

    /// Arguments where the callback occupies the options position.
    pub fn callback<F>(callback: F) -> Self
    where
        F: FnOnce(&DocumentStoreResult<T>) + Send + 'static,
    {
        Self { slot: Some(Slot::Callback(Box::new(callback))), callback: None }
    }

    /// Adds a trailing callback after the options position.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&DocumentStoreResult<T>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Resolves these arguments into canonical options and a callback.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidOptions`] when a callback was supplied both in
    /// the options position and in the trailing position.
    pub fn resolve(self) -> DocumentStoreResult<ResolvedArgs<O, T>>
    where
        O: Default,
    {
        let (options, callback) = match (self.slot, self.callback) {
            (Some(Slot::Callback(_)), Some(_)) => {
                return Err(DocumentStoreError::InvalidOptions(
                    "a completion callback was supplied twice".to_string(),
                ));
            }
            (Some(Slot::Callback(callback)), None) => (O::default(), Some(callback)),
            (Some(Slot::Options(options)), callback) => (options, callback),
            (None, callback) => (O::default(), callback),
        };

        Ok(ResolvedArgs {
            options,
            callback: Completion(callback.unwrap_or_else(|| Box::new(|_| {}))),
        })
    }
}

impl<O, T> Default for CallArgs<O, T> {
    fn default() -> Self {
        Self::none()
    }
}

/// `()` stands for "no options, no callback" on every operation.
impl<O, T> From<()> for CallArgs<O, T> {
    fn from(_: ()) -> Self {
        Self::none()
    }
}

macro_rules! options_into_args {
    ($($options:ty),* $(,)?) => {
        $(
            impl<T> From<$options> for CallArgs<$options, T> {
                fn from(options: $options) -> Self {
                    Self::options(options)
                }
            }
        )*
    };
}

options_into_args!(QueryOptions, ConnectOptions, UpdateOptions);

impl<O: Debug, T> Debug for CallArgs<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = match &self.slot {
            Some(Slot::Options(options)) => format!("Options({options:?})"),
            Some(Slot::Callback(_)) => "Callback".to_string(),
            None => "None".to_string(),
        };

        f.debug_struct("CallArgs")
            .field("slot", &slot)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Canonical arguments produced by [`CallArgs::resolve`].
pub struct ResolvedArgs<O, T> {
    pub options: O,
    pub callback: Completion<T>,
}

/// A resolved completion callback. Always present; a no-op when the caller gave none.
pub struct Completion<T>(Callback<T>);

impl<T> Completion<T> {
    /// Invokes the callback with `result` and hands the result back.
    pub fn complete(self, result: DocumentStoreResult<T>) -> DocumentStoreResult<T> {
        (self.0)(&result);
        result
    }
}
