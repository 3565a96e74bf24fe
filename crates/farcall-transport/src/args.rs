use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Positional arguments of a remote invocation.
///
/// An empty list means "no arguments". It is not the same thing as a list
/// holding a single `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    /// Serializes `value` and appends it, failing instead of panicking when
    /// its `Serialize` impl errors.
    pub fn push_serialized<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        self.0.push(serde_json::to_value(value)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Args {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Args {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Builds [`Args`] from serializable expressions.
///
/// # Panics
///
/// Panics when an argument fails to serialize (for example a map with
/// non-string keys). Use [`Args::push_serialized`] for values that can fail.
///
/// ```
/// use farcall_transport::args;
///
/// let args = args!["world", 3];
/// assert_eq!(args.len(), 2);
/// assert!(args![].is_empty());
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::none()
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::Args::new(vec![$($crate::serde_json::json!($arg)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_arguments_differs_from_single_null() {
        let none = Args::none();
        let null = crate::args![Value::Null];
        assert!(none.is_empty());
        assert_eq!(null.len(), 1);
        assert_ne!(none, null);
        assert_eq!(serde_json::to_value(&none).unwrap(), json!([]));
        assert_eq!(serde_json::to_value(&null).unwrap(), json!([null]));
    }

    #[test]
    fn test_macro_serializes_expressions() {
        let name = String::from("world");
        let args = crate::args![name, 2, json!({ "nested": true })];
        assert_eq!(
            args.into_vec(),
            vec![json!("world"), json!(2), json!({ "nested": true })]
        );
    }

    #[test]
    fn test_push_serialized_reports_failure() {
        let mut bad_keys = std::collections::BTreeMap::new();
        bad_keys.insert(vec![1u8, 2], 3u8);

        let mut args = Args::none();
        args.push_serialized("ok").unwrap();
        assert!(args.push_serialized(&bad_keys).is_err());
        assert_eq!(args.into_vec(), vec![json!("ok")]);
    }
}
