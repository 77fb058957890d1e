//! Item and inventory values exchanged with the host

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Namespace prefix accepted (and stripped) on item identifiers
const DEFAULT_NAMESPACE: &str = "minecraft:";

/// Number of primary storage slots in a player inventory
pub const STORAGE_SLOTS: usize = 36;

/// Number of armour slots
pub const ARMOR_SLOTS: usize = 4;

/// Why an item identifier was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemTypeError {
    #[error("item identifier is empty")]
    Empty,

    #[error("item identifier must start with a letter")]
    InvalidStart,

    #[error("invalid character '{0}' in item identifier")]
    InvalidCharacter(char),
}

/// Canonical item type identifier, e.g. `OAK_PLANKS`.
///
/// Parsing is case-insensitive and accepts an optional `minecraft:`
/// namespace; the stored form is upper-case without namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemType(String);

impl ItemType {
    pub fn parse(raw: &str) -> Result<Self, ItemTypeError> {
        let trimmed = raw.trim();
        let lowered = trimmed.to_ascii_lowercase();
        let name = if lowered.starts_with(DEFAULT_NAMESPACE) {
            &trimmed[DEFAULT_NAMESPACE.len()..]
        } else {
            trimmed
        };

        let mut chars = name.chars();
        match chars.next() {
            None => return Err(ItemTypeError::Empty),
            Some(c) if !c.is_ascii_alphabetic() => return Err(ItemTypeError::InvalidStart),
            Some(_) => {}
        }
        if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
            return Err(ItemTypeError::InvalidCharacter(bad));
        }

        Ok(Self(name.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemType {
    type Err = ItemTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ItemType {
    type Error = ItemTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ItemType> for String {
    fn from(value: ItemType) -> Self {
        value.0
    }
}

/// An item descriptor: type plus the attributes the policy cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_type: ItemType,

    #[serde(default = "default_amount")]
    pub amount: u32,

    /// Enchantment name -> level
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enchantments: BTreeMap<String, u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lore: Vec<String>,
}

fn default_amount() -> u32 {
    1
}

impl ItemStack {
    pub fn new(item_type: ItemType, amount: u32) -> Self {
        Self {
            item_type,
            amount,
            enchantments: BTreeMap::new(),
            display_name: None,
            lore: Vec::new(),
        }
    }

    pub fn with_enchantment(mut self, name: impl Into<String>, level: u32) -> Self {
        self.enchantments.insert(name.into(), level);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_lore(mut self, line: impl Into<String>) -> Self {
        self.lore.push(line.into());
        self
    }

    /// True when the stack carries enchantments, a custom name, or lore
    pub fn has_special_attributes(&self) -> bool {
        !self.enchantments.is_empty() || self.display_name.is_some() || !self.lore.is_empty()
    }
}

/// Full holdings of a user: storage slots, armour slots, and off-hand slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub storage: Vec<Option<ItemStack>>,

    #[serde(default)]
    pub armor: Vec<Option<ItemStack>>,

    #[serde(default)]
    pub offhand: Option<ItemStack>,
}

impl InventorySnapshot {
    /// An inventory with every slot present and empty
    pub fn empty() -> Self {
        Self {
            storage: vec![None; STORAGE_SLOTS],
            armor: vec![None; ARMOR_SLOTS],
            offhand: None,
        }
    }

    /// All occupied slots, in storage, armour, off-hand order
    pub fn items(&self) -> impl Iterator<Item = &ItemStack> {
        self.storage
            .iter()
            .chain(self.armor.iter())
            .chain(std::iter::once(&self.offhand))
            .flatten()
    }

    pub fn item_count(&self) -> usize {
        self.items().count()
    }

    pub fn is_empty(&self) -> bool {
        self.items().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_normalizes_case_and_namespace() {
        assert_eq!(ItemType::parse("oak_planks").unwrap().as_str(), "OAK_PLANKS");
        assert_eq!(ItemType::parse("minecraft:Stone").unwrap().as_str(), "STONE");
        assert_eq!(ItemType::parse("  TNT ").unwrap().as_str(), "TNT");
    }

    #[test]
    fn item_type_rejects_invalid_identifiers() {
        assert_eq!(ItemType::parse(""), Err(ItemTypeError::Empty));
        assert_eq!(ItemType::parse("minecraft:"), Err(ItemTypeError::Empty));
        assert_eq!(ItemType::parse("9LIVES"), Err(ItemTypeError::InvalidStart));
        assert_eq!(
            ItemType::parse("DIAMOND-SWORD"),
            Err(ItemTypeError::InvalidCharacter('-'))
        );
        assert!(ItemType::parse("other:STONE").is_err());
    }

    #[test]
    fn item_type_deserialization_validates() {
        let ok: ItemType = serde_json::from_str("\"bedrock\"").unwrap();
        assert_eq!(ok.as_str(), "BEDROCK");

        let bad = serde_json::from_str::<ItemType>("\"not an item\"");
        assert!(bad.is_err());
    }

    #[test]
    fn special_attributes() {
        let plain = ItemStack::new(ItemType::parse("STONE").unwrap(), 64);
        assert!(!plain.has_special_attributes());
        assert!(plain.clone().with_enchantment("unbreaking", 3).has_special_attributes());
        assert!(plain.clone().with_display_name("Rock").has_special_attributes());
        assert!(plain.with_lore("Ancient").has_special_attributes());
    }

    #[test]
    fn item_stack_amount_defaults_to_one() {
        let stack: ItemStack = serde_json::from_str(r#"{"item_type":"dirt"}"#).unwrap();
        assert_eq!(stack.amount, 1);
        assert!(stack.enchantments.is_empty());
    }

    #[test]
    fn inventory_item_iteration_covers_all_slot_groups() {
        let mut inv = InventorySnapshot::empty();
        assert!(inv.is_empty());
        assert_eq!(inv.storage.len(), STORAGE_SLOTS);

        inv.storage[3] = Some(ItemStack::new(ItemType::parse("DIRT").unwrap(), 12));
        inv.armor[0] = Some(ItemStack::new(ItemType::parse("IRON_BOOTS").unwrap(), 1));
        inv.offhand = Some(ItemStack::new(ItemType::parse("SHIELD").unwrap(), 1));

        assert_eq!(inv.item_count(), 3);
        assert!(!inv.is_empty());
    }
}
