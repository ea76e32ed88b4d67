use examdesk_core::domain::{Intent, SlotField, Slots};

use crate::matching::is_email;

/// Required fields absent or empty in `slots`, in schema order.
pub fn missing_fields(intent: Intent, slots: &Slots) -> Vec<SlotField> {
    intent.missing_fields(slots)
}

/// Present values the intent cannot use as they are.
pub fn invalid_fields(intent: Intent, slots: &Slots) -> Vec<SlotField> {
    match (intent, slots.get(SlotField::AccountIdentifier)) {
        // New accounts log in with an email address.
        (Intent::CreateStudent, Some(identifier)) if !is_email(identifier) => {
            vec![SlotField::AccountIdentifier]
        }
        _ => Vec::new(),
    }
}

/// Everything that must be (re)collected before dispatch, in schema order.
pub fn pending_fields(intent: Intent, slots: &Slots) -> Vec<SlotField> {
    let missing = missing_fields(intent, slots);
    let invalid = invalid_fields(intent, slots);
    intent
        .required_fields()
        .filter(|field| missing.contains(field) || invalid.contains(field))
        .collect()
}
