//! Failure aggregation
//!
//! When work fans out across concurrent units, a single failing unit
//! must not hide the others: every captured failure is bundled into one
//! [`AggregateError`] and surfaced only after all units have settled.

use std::fmt;

/// One captured failure, tagged with the index of the unit of work
/// (an iteration index, action position, or handler position).
#[derive(Debug)]
pub enum Failure<E> {
    /// The unit returned an error.
    Err {
        /// Index of the failing unit.
        index: usize,
        /// The error it returned.
        error: E,
    },
    /// The unit panicked.
    Panic {
        /// Index of the failing unit.
        index: usize,
        /// Panic payload rendered to text.
        message: String,
    },
}

impl<E> Failure<E> {
    /// Index of the unit that failed.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Err { index, .. } | Self::Panic { index, .. } => *index,
        }
    }
}

/// Every failure captured across one batch of concurrent units of work.
///
/// Never constructed empty; never surfaced before all units settle.
#[derive(Debug)]
pub struct AggregateError<E> {
    failures: Vec<Failure<E>>,
}

impl<E> AggregateError<E> {
    /// Bundle captured failures.
    ///
    /// # Panics
    ///
    /// Panics if `failures` is empty: an aggregate with nothing in it is
    /// a success, not an error.
    #[must_use]
    pub fn new(failures: Vec<Failure<E>>) -> Self {
        assert!(!failures.is_empty(), "aggregate of zero failures");
        Self { failures }
    }

    /// The captured failures, in capture order.
    #[must_use]
    pub fn failures(&self) -> &[Failure<E>] {
        &self.failures
    }

    /// Number of captured failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Always false: aggregates are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Consume the aggregate, yielding the captured failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<Failure<E>> {
        self.failures
    }
}

impl<E> fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} unit(s) of work failed (indices: ",
            self.failures.len()
        )?;
        for (i, failure) in self.failures.iter().take(8).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", failure.index())?;
        }
        if self.failures.len() > 8 {
            f.write_str(", ..")?;
        }
        f.write_str(")")
    }
}

impl<E: fmt::Debug> std::error::Error for AggregateError<E> {}

/// Render a `catch_unwind` payload to text.
///
/// String payloads come through verbatim; anything else gets a generic
/// description.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unit of work panicked".to_string()
    }
}
