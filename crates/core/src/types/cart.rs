//! Cart contents: a mapping from product to a positive quantity.
//!
//! The cart never stores a zero quantity. Every mutation that would bring an
//! entry to zero deletes the entry instead, which `NonZeroU32` enforces at the
//! type level.
//!
//! The device and remote representation is a plain JSON object:
//!
//! ```json
//! { "pineapple-chips": 2, "mango-slices": 1 }
//! ```

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::ProductId;

/// Errors that can occur when decoding a [`Cart`] payload.
#[derive(thiserror::Error, Debug)]
pub enum CartParseError {
    /// The payload is not valid JSON.
    #[error("invalid cart JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload is valid JSON but not an object.
    #[error("cart payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A shopping cart.
///
/// Insertion order is irrelevant; entries are kept sorted by product ID so
/// the serialized form is deterministic.
///
/// ## Examples
///
/// ```
/// use storehouse_core::{Cart, ProductId};
///
/// let chips = ProductId::new("pineapple-chips");
/// let mut cart = Cart::new();
/// cart.add(chips.clone(), 1);
/// cart.add(chips.clone(), 1);
/// assert_eq!(cart.quantity(&chips), 2);
///
/// cart.decrease(&chips);
/// cart.decrease(&chips);
/// assert!(cart.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Cart {
    items: BTreeMap<ProductId, NonZeroU32>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// Decode a cart from its JSON payload.
    ///
    /// An empty or whitespace-only payload is the empty cart. Entries whose
    /// quantity is not a positive integer are dropped, and quantities above
    /// `u32::MAX` saturate.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not JSON or not a JSON object.
    pub fn from_json(payload: &str) -> Result<Self, CartParseError> {
        if payload.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: Value = serde_json::from_str(payload)?;
        Self::try_from(value)
    }

    /// Encode the cart as its JSON payload.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Quantity of a product, zero when absent.
    #[must_use]
    pub fn quantity(&self, product: &ProductId) -> u32 {
        self.items.get(product).map_or(0, |q| q.get())
    }

    /// Whether the product has an entry.
    #[must_use]
    pub fn contains(&self, product: &ProductId) -> bool {
        self.items.contains_key(product)
    }

    /// Add `quantity` units of a product, creating the entry if absent.
    ///
    /// Adding zero units is a no-op. Returns the new quantity.
    pub fn add(&mut self, product: ProductId, quantity: u32) -> u32 {
        let Some(delta) = NonZeroU32::new(quantity) else {
            return self.quantity(&product);
        };
        let entry = self
            .items
            .entry(product)
            .and_modify(|q| *q = q.saturating_add(delta.get()))
            .or_insert(delta);
        entry.get()
    }

    /// Remove a single unit of a product.
    ///
    /// The entry is deleted when its last unit is removed. Returns the new
    /// quantity (zero when the entry is gone or was never present).
    pub fn decrease(&mut self, product: &ProductId) -> u32 {
        let Some(current) = self.items.get(product).copied() else {
            return 0;
        };
        match NonZeroU32::new(current.get() - 1) {
            Some(next) => {
                self.items.insert(product.clone(), next);
                next.get()
            }
            None => {
                self.items.remove(product);
                0
            }
        }
    }

    /// Set the quantity of a product outright. Zero deletes the entry.
    pub fn set_quantity(&mut self, product: ProductId, quantity: u32) {
        match NonZeroU32::new(quantity) {
            Some(q) => {
                self.items.insert(product, q);
            }
            None => {
                self.items.remove(&product);
            }
        }
    }

    /// Delete a product's entry regardless of its quantity.
    ///
    /// Returns the quantity that was removed, if any.
    pub fn remove(&mut self, product: &ProductId) -> Option<u32> {
        self.items.remove(product).map(NonZeroU32::get)
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all products (cart badge count).
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.items
            .values()
            .fold(0u32, |acc, q| acc.saturating_add(q.get()))
    }

    /// Iterate over `(product, quantity)` pairs in product order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, u32)> {
        self.items.iter().map(|(id, q)| (id, q.get()))
    }

    /// Combine two carts by summing quantities per product.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (product, quantity) in other.iter() {
            merged.add(product.clone(), quantity);
        }
        merged
    }
}

impl FromIterator<(ProductId, u32)> for Cart {
    fn from_iter<I: IntoIterator<Item = (ProductId, u32)>>(iter: I) -> Self {
        let mut cart = Self::new();
        for (product, quantity) in iter {
            cart.add(product, quantity);
        }
        cart
    }
}

impl TryFrom<Value> for Cart {
    type Error = CartParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let object = match value {
            Value::Object(object) => object,
            Value::Null => return Err(CartParseError::NotAnObject("null")),
            Value::Bool(_) => return Err(CartParseError::NotAnObject("a boolean")),
            Value::Number(_) => return Err(CartParseError::NotAnObject("a number")),
            Value::String(_) => return Err(CartParseError::NotAnObject("a string")),
            Value::Array(_) => return Err(CartParseError::NotAnObject("an array")),
        };

        let items = object
            .into_iter()
            .filter_map(|(product, quantity)| {
                let quantity = positive_quantity(&quantity)?;
                Some((ProductId::new(product), quantity))
            })
            .collect();
        Ok(Self { items })
    }
}

/// Interpret a JSON value as a positive quantity, saturating at `u32::MAX`.
fn positive_quantity(value: &Value) -> Option<NonZeroU32> {
    let raw = value.as_u64()?;
    NonZeroU32::new(u32::try_from(raw).unwrap_or(u32::MAX))
}

impl<'de> Deserialize<'de> for Cart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn id(s: &str) -> ProductId {
        ProductId::new(s)
    }

    #[test]
    fn test_add_is_additive() {
        let mut cart = Cart::new();
        cart.add(id("a"), 1);
        cart.add(id("a"), 1);
        assert_eq!(cart.quantity(&id("a")), 2);
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn test_add_zero_is_noop() {
        let mut cart = Cart::new();
        assert_eq!(cart.add(id("a"), 0), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_saturates() {
        let mut cart = Cart::new();
        cart.add(id("a"), u32::MAX);
        cart.add(id("a"), 5);
        assert_eq!(cart.quantity(&id("a")), u32::MAX);
    }

    #[test]
    fn test_decrease_to_zero_removes_entry() {
        let mut cart: Cart = [(id("a"), 1)].into_iter().collect();
        assert_eq!(cart.decrease(&id("a")), 0);
        assert!(!cart.contains(&id("a")));
        assert_eq!(cart.to_json().unwrap(), "{}");
    }

    #[test]
    fn test_decrease_decrements() {
        let mut cart: Cart = [(id("a"), 3)].into_iter().collect();
        assert_eq!(cart.decrease(&id("a")), 2);
        assert_eq!(cart.quantity(&id("a")), 2);
    }

    #[test]
    fn test_decrease_missing_product() {
        let mut cart = Cart::new();
        assert_eq!(cart.decrease(&id("ghost")), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_is_unconditional() {
        let mut cart: Cart = [(id("a"), 5)].into_iter().collect();
        assert_eq!(cart.remove(&id("a")), Some(5));
        assert!(cart.is_empty());
        assert_eq!(cart.remove(&id("a")), None);
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart: Cart = [(id("a"), 2)].into_iter().collect();
        cart.set_quantity(id("a"), 7);
        assert_eq!(cart.quantity(&id("a")), 7);
        cart.set_quantity(id("a"), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_mixed_sequences_never_store_zero() {
        let mut cart = Cart::new();
        let ops: [(&str, i8); 10] = [
            ("a", 1),
            ("b", 1),
            ("a", -1),
            ("a", -1),
            ("b", 1),
            ("b", -1),
            ("c", -1),
            ("b", -1),
            ("a", 1),
            ("b", -1),
        ];
        for (product, op) in ops {
            if op > 0 {
                cart.add(id(product), 1);
            } else {
                cart.decrease(&id(product));
            }
            assert!(cart.iter().all(|(_, q)| q > 0));
        }
        assert_eq!(cart.quantity(&id("a")), 1);
        assert!(!cart.contains(&id("b")));
    }

    #[test]
    fn test_total_quantity() {
        let cart: Cart = [(id("a"), 2), (id("b"), 3)].into_iter().collect();
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_merged_with_sums_quantities() {
        let local: Cart = [(id("a"), 2), (id("b"), 1)].into_iter().collect();
        let remote: Cart = [(id("b"), 4), (id("c"), 1)].into_iter().collect();
        let merged = local.merged_with(&remote);
        assert_eq!(merged.quantity(&id("a")), 2);
        assert_eq!(merged.quantity(&id("b")), 5);
        assert_eq!(merged.quantity(&id("c")), 1);
    }

    #[test]
    fn test_from_json_empty_payload() {
        assert!(Cart::from_json("").unwrap().is_empty());
        assert!(Cart::from_json("   ").unwrap().is_empty());
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            Cart::from_json("{not json"),
            Err(CartParseError::Json(_))
        ));
        assert!(matches!(
            Cart::from_json("[1, 2]"),
            Err(CartParseError::NotAnObject(_))
        ));
        assert!(matches!(
            Cart::from_json("null"),
            Err(CartParseError::NotAnObject("null"))
        ));
    }

    #[test]
    fn test_from_json_drops_invalid_entries() {
        let cart = Cart::from_json(r#"{"a": 2, "b": 0, "c": -1, "d": "3", "e": 1.5}"#).unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.quantity(&id("a")), 2);
    }

    #[test]
    fn test_json_format_is_plain_object() {
        let cart: Cart = [(id("b"), 1), (id("a"), 2)].into_iter().collect();
        assert_eq!(cart.to_json().unwrap(), r#"{"a":2,"b":1}"#);
        assert_eq!(Cart::from_json(r#"{"a":2,"b":1}"#).unwrap(), cart);
    }

    #[test]
    fn test_deserialize_is_lenient() {
        let cart: Cart = serde_json::from_str(r#"{"a": 1, "b": 0}"#).unwrap();
        assert_eq!(cart.len(), 1);
    }
}
