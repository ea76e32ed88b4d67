use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic field names a slot value can be bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotField {
    AccountIdentifier,
    FirstName,
    LastName,
    Password,
    ExamName,
    ReferenceCode,
}

impl SlotField {
    pub const ALL: [SlotField; 6] = [
        SlotField::AccountIdentifier,
        SlotField::FirstName,
        SlotField::LastName,
        SlotField::Password,
        SlotField::ExamName,
        SlotField::ReferenceCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountIdentifier => "account_identifier",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Password => "password",
            Self::ExamName => "exam_name",
            Self::ReferenceCode => "reference_code",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "account_identifier" | "student_id" | "email" => Some(Self::AccountIdentifier),
            "first_name" => Some(Self::FirstName),
            "last_name" => Some(Self::LastName),
            "password" => Some(Self::Password),
            "exam_name" => Some(Self::ExamName),
            "reference_code" | "user_exam_id" => Some(Self::ReferenceCode),
            _ => None,
        }
    }

    /// Fields that may hold an opaque backend identifier.
    pub fn is_identifier(&self) -> bool {
        matches!(self, Self::AccountIdentifier | Self::ReferenceCode)
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Password)
    }
}

impl fmt::Display for SlotField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated field values for one session. Empty values are never stored.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slots(BTreeMap<SlotField, String>);

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: SlotField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn has(&self, field: SlotField) -> bool {
        self.get(field).is_some()
    }

    /// Stores `value` when it is non-empty after trimming. Returns whether it was stored.
    pub fn set(&mut self, field: SlotField, value: impl Into<String>) -> bool {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.0.insert(field, trimmed.to_string());
        true
    }

    pub fn with(mut self, field: SlotField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// New non-empty values overwrite; fields absent from `update` keep their value.
    pub fn merge(&mut self, update: &Slots) {
        for (field, value) in &update.0 {
            self.set(*field, value.clone());
        }
    }

    pub fn merged(&self, update: &Slots) -> Slots {
        let mut merged = self.clone();
        merged.merge(update);
        merged
    }

    pub fn without_secrets(&self) -> Slots {
        Slots(
            self.0
                .iter()
                .filter(|(field, _)| !field.is_secret())
                .map(|(field, value)| (*field, value.clone()))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotField, &str)> {
        self.0.iter().map(|(field, value)| (*field, value.as_str()))
    }

    pub fn fields(&self) -> Vec<SlotField> {
        self.0.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in &self.0 {
            if field.is_secret() {
                map.entry(&field.as_str(), &"<redacted>");
            } else {
                map.entry(&field.as_str(), value);
            }
        }
        map.finish()
    }
}
