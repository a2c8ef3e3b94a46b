//! Call arguments as seen by the key builder.
//!
//! Every argument is rendered through [`KeyValue`], which is only
//! implemented for types with a single rendering per value. Unordered
//! collections are sorted, and floats without a JSON form are rejected.

use crate::identity::InstanceKey;
use crate::{error::Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::BuildHasher;
use std::rc::Rc;
use std::sync::Arc;

/// A value with exactly one key rendering.
///
/// Equal values render identically and distinct values of one type render
/// differently. Implement it on your own types by composing the renderings
/// of their fields:
///
/// ```
/// use callcache::KeyValue;
///
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// impl KeyValue for Point {
///     fn key_value(&self) -> callcache::Result<serde_json::Value> {
///         (self.x, self.y).key_value()
///     }
/// }
/// ```
pub trait KeyValue {
    /// Renders `self` for the cache key.
    fn key_value(&self) -> Result<Value>;
}

fn to_json_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::UnserializableArgument(e.to_string()))
}

macro_rules! impl_key_value_via_json {
    ($($ty:ty),+) => {$(
        impl KeyValue for $ty {
            fn key_value(&self) -> Result<Value> {
                to_json_value(self)
            }
        }
    )+};
}

impl_key_value_via_json!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, str, String
);

// JSON renders NaN and both infinities as `null`.
macro_rules! impl_key_value_for_float {
    ($($ty:ty),+) => {$(
        impl KeyValue for $ty {
            fn key_value(&self) -> Result<Value> {
                if !self.is_finite() {
                    return Err(Error::UnserializableArgument(format!(
                        "non-finite float `{}` has no key rendering",
                        self
                    )));
                }
                to_json_value(self)
            }
        }
    )+};
}

impl_key_value_for_float!(f32, f64);

impl<T: KeyValue> KeyValue for Option<T> {
    fn key_value(&self) -> Result<Value> {
        match self {
            None => Ok(Value::Null),
            Some(value) => match value.key_value()? {
                Value::Null => Err(Error::UnserializableArgument(
                    "`Some` of a null-rendering value is indistinguishable from `None`"
                        .to_string(),
                )),
                rendered => Ok(rendered),
            },
        }
    }
}

fn render_seq<'a, T, I>(items: I) -> Result<Value>
where
    T: KeyValue + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items
        .into_iter()
        .map(KeyValue::key_value)
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

impl<T: KeyValue> KeyValue for [T] {
    fn key_value(&self) -> Result<Value> {
        render_seq(self)
    }
}

impl<T: KeyValue, const N: usize> KeyValue for [T; N] {
    fn key_value(&self) -> Result<Value> {
        render_seq(self)
    }
}

impl<T: KeyValue> KeyValue for Vec<T> {
    fn key_value(&self) -> Result<Value> {
        render_seq(self)
    }
}

impl<T: KeyValue> KeyValue for VecDeque<T> {
    fn key_value(&self) -> Result<Value> {
        render_seq(self)
    }
}

impl<T: KeyValue> KeyValue for BTreeSet<T> {
    fn key_value(&self) -> Result<Value> {
        render_seq(self)
    }
}

impl<T: KeyValue, S: BuildHasher> KeyValue for HashSet<T, S> {
    fn key_value(&self) -> Result<Value> {
        let mut items = self
            .iter()
            .map(KeyValue::key_value)
            .collect::<Result<Vec<_>>>()?;
        items.sort_by_cached_key(Value::to_string);
        Ok(Value::Array(items))
    }
}

fn render_map_key(key: Value) -> Result<String> {
    match key {
        Value::String(key) => Ok(key),
        Value::Number(key) => Ok(key.to_string()),
        Value::Bool(key) => Ok(key.to_string()),
        other => Err(Error::UnserializableArgument(format!(
            "map key `{}` is not a string, number or bool",
            other
        ))),
    }
}

fn render_map<'a, K, V, I>(entries: I) -> Result<Value>
where
    K: KeyValue + 'a,
    V: KeyValue + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    let mut rendered = entries
        .into_iter()
        .map(|(key, value)| -> Result<(String, Value)> {
            Ok((render_map_key(key.key_value()?)?, value.key_value()?))
        })
        .collect::<Result<Vec<_>>>()?;
    rendered.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(Value::Object(rendered.into_iter().collect()))
}

impl<K: KeyValue, V: KeyValue> KeyValue for BTreeMap<K, V> {
    fn key_value(&self) -> Result<Value> {
        render_map(self)
    }
}

impl<K: KeyValue, V: KeyValue, S: BuildHasher> KeyValue for HashMap<K, V, S> {
    fn key_value(&self) -> Result<Value> {
        render_map(self)
    }
}

/// Raw JSON is taken as given, with object keys put in sorted order.
impl KeyValue for Value {
    fn key_value(&self) -> Result<Value> {
        Ok(canonical(self))
    }
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonical(value)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

impl<T: KeyValue + ?Sized> KeyValue for &T {
    fn key_value(&self) -> Result<Value> {
        (**self).key_value()
    }
}

impl<T: KeyValue + ?Sized> KeyValue for Box<T> {
    fn key_value(&self) -> Result<Value> {
        (**self).key_value()
    }
}

impl<T: KeyValue + ?Sized> KeyValue for Arc<T> {
    fn key_value(&self) -> Result<Value> {
        (**self).key_value()
    }
}

impl<T: KeyValue + ?Sized> KeyValue for Rc<T> {
    fn key_value(&self) -> Result<Value> {
        (**self).key_value()
    }
}

impl<T: KeyValue + ToOwned + ?Sized> KeyValue for Cow<'_, T> {
    fn key_value(&self) -> Result<Value> {
        (**self).key_value()
    }
}

macro_rules! impl_key_value_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: KeyValue),+> KeyValue for ($($name,)+) {
            #[allow(non_snake_case)]
            fn key_value(&self) -> Result<Value> {
                let ($($name,)+) = self;
                Ok(Value::Array(vec![$($name.key_value()?),+]))
            }
        }
    };
}

impl_key_value_for_tuple!(A);
impl_key_value_for_tuple!(A, B);
impl_key_value_for_tuple!(A, B, C);
impl_key_value_for_tuple!(A, B, C, D);
impl_key_value_for_tuple!(A, B, C, D, E);
impl_key_value_for_tuple!(A, B, C, D, E, F);
impl_key_value_for_tuple!(A, B, C, D, E, F, G);
impl_key_value_for_tuple!(A, B, C, D, E, F, G, H);

/// The cache-relevant shape of one invocation: positional values in call
/// order, keyword values in canonical (sorted) order, and the receiver's
/// instance key for bound methods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyArgs {
    positional: Vec<Value>,
    keywords: BTreeMap<String, Value>,
    receiver: Option<String>,
}

impl KeyArgs {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg<T: KeyValue + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.positional.push(value.key_value()?);
        Ok(self)
    }

    /// Sets a keyword argument. Setting the same name twice keeps the last value.
    pub fn kwarg<T: KeyValue + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Result<Self> {
        self.keywords.insert(name.into(), value.key_value()?);
        Ok(self)
    }

    /// Binds the argument set to a method receiver.
    pub fn with_receiver<R: InstanceKey + ?Sized>(mut self, receiver: &R) -> Self {
        self.receiver = Some(receiver.instance_key());
        self
    }

    /// Positional values in call order.
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// Keyword values, sorted by name.
    pub fn keywords(&self) -> &BTreeMap<String, Value> {
        &self.keywords
    }

    /// The receiver's instance key, if bound.
    pub fn receiver(&self) -> Option<&str> {
        self.receiver.as_deref()
    }
}

/// Argument types a memoized callable can be invoked with.
///
/// Tuples of [`KeyValue`] values are positional arguments. Implement this
/// trait on a struct to expose named (keyword) arguments:
///
/// ```
/// use callcache::{CacheArgs, KeyArgs};
///
/// struct Search<'a> {
///     query: &'a str,
///     limit: usize,
/// }
///
/// impl CacheArgs for Search<'_> {
///     fn key_args(&self) -> callcache::Result<KeyArgs> {
///         KeyArgs::new().arg(self.query)?.kwarg("limit", &self.limit)
///     }
/// }
/// ```
pub trait CacheArgs {
    /// Renders `self` into the structured form the key builder consumes.
    fn key_args(&self) -> Result<KeyArgs>;
}

impl CacheArgs for KeyArgs {
    fn key_args(&self) -> Result<KeyArgs> {
        Ok(self.clone())
    }
}

impl CacheArgs for () {
    fn key_args(&self) -> Result<KeyArgs> {
        Ok(KeyArgs::new())
    }
}

macro_rules! impl_cache_args_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: KeyValue),+> CacheArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn key_args(&self) -> Result<KeyArgs> {
                let ($($name,)+) = self;
                let args = KeyArgs::new();
                $(let args = args.arg($name)?;)+
                Ok(args)
            }
        }
    };
}

impl_cache_args_for_tuple!(A);
impl_cache_args_for_tuple!(A, B);
impl_cache_args_for_tuple!(A, B, C);
impl_cache_args_for_tuple!(A, B, C, D);
impl_cache_args_for_tuple!(A, B, C, D, E);
impl_cache_args_for_tuple!(A, B, C, D, E, F);
impl_cache_args_for_tuple!(A, B, C, D, E, F, G);
impl_cache_args_for_tuple!(A, B, C, D, E, F, G, H);

/// Arguments of a bound method call: the receiver plus the remaining args.
///
/// The receiver is keyed through [`InstanceKey`] and never appears among the
/// positional values.
#[derive(Debug, Clone)]
pub struct Bound<R, A> {
    /// The instance the method is called on.
    pub receiver: R,
    /// The method's own arguments.
    pub args: A,
}

impl<R, A> Bound<R, A> {
    /// Pairs a receiver with its call arguments.
    pub fn new(receiver: R, args: A) -> Self {
        Self { receiver, args }
    }
}

impl<R: InstanceKey, A: CacheArgs> CacheArgs for Bound<R, A> {
    fn key_args(&self) -> Result<KeyArgs> {
        Ok(self.args.key_args()?.with_receiver(&self.receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tuple_args_are_positional() {
        let args = (3, "x", true).key_args().unwrap();
        assert_eq!(args.positional(), &[json!(3), json!("x"), json!(true)]);
        assert!(args.keywords().is_empty());
        assert!(args.receiver().is_none());
    }

    #[test]
    fn test_keywords_are_sorted() {
        let args = KeyArgs::new()
            .kwarg("b", &2)
            .unwrap()
            .kwarg("a", &1)
            .unwrap();
        let names: Vec<_> = args.keywords().keys().cloned().collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_repeated_keyword_keeps_last_value() {
        let args = KeyArgs::new()
            .kwarg("a", &1)
            .unwrap()
            .kwarg("a", &5)
            .unwrap();
        assert_eq!(args.keywords().get("a"), Some(&json!(5)));
    }

    #[test]
    fn test_non_string_map_keys_are_unserializable() {
        let mut map = BTreeMap::new();
        map.insert((1, 2), "pair");
        let err = KeyArgs::new().arg(&map).unwrap_err();
        assert!(matches!(err, Error::UnserializableArgument(_)));
    }

    #[test]
    fn test_non_finite_floats_are_unserializable() {
        for value in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let err = (value,).key_args().unwrap_err();
            assert!(matches!(err, Error::UnserializableArgument(_)));
        }
        let err = (Some(vec![1.0f32, f32::NAN]),).key_args().unwrap_err();
        assert!(matches!(err, Error::UnserializableArgument(_)));

        let args = (1.5f64, -0.0f64).key_args().unwrap();
        assert_eq!(args.positional(), &[json!(1.5), json!(-0.0)]);
    }

    #[test]
    fn test_nested_none_is_unserializable() {
        let err = (Some(None::<u8>),).key_args().unwrap_err();
        assert!(matches!(err, Error::UnserializableArgument(_)));
        assert_eq!((None::<Option<u8>>,).key_args().unwrap().positional(), &[json!(null)]);
        assert_eq!((Some(Some(3u8)),).key_args().unwrap().positional(), &[json!(3)]);
    }

    #[test]
    fn test_hash_set_renders_in_sorted_order() {
        let forward: HashSet<u32> = (0..32).collect();
        let backward: HashSet<u32> = (0..32).rev().collect();
        assert_eq!(forward.key_value().unwrap(), backward.key_value().unwrap());

        let in_order: Vec<u32> = (0..32).collect();
        let mut sorted_as_text = in_order.clone();
        sorted_as_text.sort_by_key(|n| n.to_string());
        assert_eq!(forward.key_value().unwrap(), json!(sorted_as_text));

        let ordered: BTreeSet<u32> = (0..32).collect();
        assert_eq!(ordered.key_value().unwrap(), json!(in_order));
    }

    #[test]
    fn test_hash_map_renders_sorted_keys() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for n in 0..32u32 {
            first.insert(n.to_string(), n);
            second.insert((31 - n).to_string(), 31 - n);
        }
        let rendered = first.key_value().unwrap();
        assert_eq!(rendered, second.key_value().unwrap());
        assert_eq!(
            serde_json::to_string(&rendered).unwrap(),
            serde_json::to_string(&second.key_value().unwrap()).unwrap()
        );
    }

    #[test]
    fn test_raw_json_objects_are_canonical() {
        let value = json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(
            serde_json::to_string(&value.key_value().unwrap()).unwrap(),
            r#"{"a":{"c":3,"d":2},"b":1}"#
        );
    }

    #[test]
    fn test_bound_args_carry_receiver() {
        struct Shelf;
        impl InstanceKey for Shelf {
            fn instance_key(&self) -> String {
                "shelf-1".to_string()
            }
        }

        let args = Bound::new(Shelf, (10u32,)).key_args().unwrap();
        assert_eq!(args.receiver(), Some("shelf-1"));
        assert_eq!(args.positional(), &[json!(10)]);
    }
}
