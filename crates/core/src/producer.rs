//! Producers, their positional arguments, and the async completion handle.

use crate::Value;
use std::any::Any;
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome reported by an async producer.
pub type Outcome = Result<Value, anyhow::Error>;

/// A named unit of computation.
///
/// Sync producers return their value directly. Async producers receive a
/// [`Completion`] among their arguments; whatever they return is ignored and
/// the node resolves to the value passed to the completion instead.
pub trait Producer: Send + Sync {
    /// Invoke the producer with its resolved arguments.
    fn invoke(&self, args: Args) -> Value;
}

impl<F> Producer for F
where
    F: Fn(Args) -> Value + Send + Sync,
{
    fn invoke(&self, args: Args) -> Value {
        self(args)
    }
}

/// Positional arguments for one producer invocation.
///
/// There is one slot per declared dependency, in declared order. The slot
/// of the reserved completion parameter carries no value.
#[derive(Debug, Default)]
pub struct Args {
    values: Vec<Option<Value>>,
    completion: Option<(usize, Completion)>,
}

impl Args {
    /// Create empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolved value slot.
    pub fn push(&mut self, value: Value) {
        self.values.push(Some(value));
    }

    /// Append the completion slot.
    pub fn push_completion(&mut self, completion: Completion) {
        self.completion = Some((self.values.len(), completion));
        self.values.push(None);
    }

    /// Number of positional slots.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no slots.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The resolved value at `position`, `None` for the completion slot.
    pub fn get(&self, position: usize) -> Option<&Value> {
        self.values.get(position).and_then(Option::as_ref)
    }

    /// The resolved value at `position`, typed.
    pub fn get_as<T: Any>(&self, position: usize) -> Option<&T> {
        self.get(position).and_then(Value::downcast_ref)
    }

    /// Position of the completion slot, if this is an async invocation.
    pub fn completion_position(&self) -> Option<usize> {
        self.completion.as_ref().map(|(position, _)| *position)
    }

    /// Whether the slot at `position` is the completion parameter.
    pub fn is_completion(&self, position: usize) -> bool {
        self.completion_position() == Some(position)
    }

    /// Move the completion handle out of the arguments.
    pub fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take().map(|(_, completion)| completion)
    }
}

/// Completion handle handed to async producers.
///
/// Consuming `self` on every call means a producer can report at most one
/// outcome. Reports that arrive after the run has moved on are dropped.
#[derive(Debug)]
pub struct Completion {
    producer: String,
    tx: oneshot::Sender<Outcome>,
}

impl Completion {
    /// Create a completion handle and the receiver the scheduler waits on.
    pub fn channel(producer: impl Into<String>) -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            producer: producer.into(),
            tx,
        };
        (completion, rx)
    }

    /// Name of the producer this handle belongs to.
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Report the outcome, `(error, value)` style.
    pub fn complete(self, outcome: Outcome) {
        if self.tx.send(outcome).is_err() {
            debug!(producer = %self.producer, "Late completion ignored");
        }
    }

    /// Report success.
    pub fn resolve(self, value: Value) {
        self.complete(Ok(value));
    }

    /// Report failure.
    pub fn fail(self, error: impl Into<anyhow::Error>) {
        self.complete(Err(error.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_positions() {
        let (completion, _rx) = Completion::channel("p");
        let mut args = Args::new();
        args.push(Value::new(1u8));
        args.push_completion(completion);
        args.push(Value::new("x"));

        assert_eq!(args.len(), 3);
        assert_eq!(args.get_as::<u8>(0), Some(&1));
        assert!(args.get(1).is_none());
        assert!(args.is_completion(1));
        assert_eq!(args.get_as::<&str>(2), Some(&"x"));
        assert_eq!(args.completion_position(), Some(1));

        let completion = args.take_completion().unwrap();
        assert_eq!(completion.producer(), "p");
        assert!(args.take_completion().is_none());
    }

    #[test]
    fn test_closure_is_producer() {
        let producer = |args: Args| Value::new(args.len());
        let value = producer.invoke(Args::new());
        assert_eq!(value.downcast_ref::<usize>(), Some(&0));
    }

    #[tokio::test]
    async fn test_completion_delivers_value() {
        let (completion, rx) = Completion::channel("p");
        completion.resolve(Value::new(5i32));
        let value = rx.await.unwrap().unwrap();
        assert_eq!(value.downcast_ref::<i32>(), Some(&5));
    }

    #[tokio::test]
    async fn test_completion_delivers_error() {
        let (completion, rx) = Completion::channel("p");
        completion.fail(anyhow::anyhow!("I am an error!"));
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "I am an error!");
    }

    #[test]
    fn test_completion_after_receiver_dropped() {
        let (completion, rx) = Completion::channel("p");
        drop(rx);
        // Must not panic.
        completion.resolve(Value::unit());
    }
}
