//! Microsoft Graph wire types
//!
//! Serde mirrors of the Graph v1.0 JSON shapes this server touches. Only the
//! fields we read or write are modeled; unknown fields are ignored on
//! deserialization and `None` fields are omitted on serialization.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeTimeZone {
    pub date_time: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email_address: EmailAddress,
    #[serde(rename = "type")]
    pub attendee_type: String,
}

impl Attendee {
    pub fn required(address: &str) -> Self {
        Self {
            email_address: EmailAddress {
                address: address.to_string(),
                name: None,
            },
            attendee_type: "required".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub display_name: String,
}

/// A calendar event. Used for both create payloads and read responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<ItemBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTimeTimeZone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTimeTimeZone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_link: Option<String>,
}

/// Start/end for PATCH requests. Unlike [`DateTimeTimeZone`], the zone is
/// optional and omitted from the wire when absent, leaving the event's
/// existing zone untouched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeTimeZonePatch {
    pub date_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// Partial update for PATCH requests. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<ItemBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTimeTimeZonePatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTimeTimeZonePatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEmailAddress {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub scored_email_addresses: Vec<ScoredEmailAddress>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

impl Person {
    /// Relevance-ranked email first, falling back to the sign-in name.
    pub fn best_email(&self) -> Option<&str> {
        self.scored_email_addresses
            .first()
            .map(|s| s.address.as_str())
            .or(self.user_principal_name.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

impl User {
    pub fn effective_email(&self) -> Option<&str> {
        self.mail.as_deref().or(self.user_principal_name.as_deref())
    }
}

/// A directory match from either the people or the users endpoint.
#[derive(Debug, Clone)]
pub struct PersonMatch {
    pub display_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    pub value: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_camel_case_and_skips_absent_fields() {
        let event = Event {
            subject: Some("Standup".to_string()),
            start: Some(DateTimeTimeZone {
                date_time: "2026-09-01T12:00:00".to_string(),
                time_zone: "GMT Standard Time".to_string(),
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["subject"], "Standup");
        assert_eq!(json["start"]["dateTime"], "2026-09-01T12:00:00");
        assert_eq!(json["start"]["timeZone"], "GMT Standard Time");
        assert!(json.get("attendees").is_none());
        assert!(json.get("webLink").is_none());
    }

    #[test]
    fn test_patch_omits_absent_time_zone() {
        let patch = EventPatch {
            start: Some(DateTimeTimeZonePatch {
                date_time: "2026-09-01T12:00:00".to_string(),
                time_zone: None,
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["start"]["dateTime"], "2026-09-01T12:00:00");
        assert!(json["start"].get("timeZone").is_none());
        assert!(json.get("subject").is_none());
    }

    #[test]
    fn test_attendee_type_field_name() {
        let attendee = Attendee::required("ada@contoso.com");
        let json = serde_json::to_value(&attendee).unwrap();
        assert_eq!(json["type"], "required");
        assert_eq!(json["emailAddress"]["address"], "ada@contoso.com");
    }

    #[test]
    fn test_person_best_email_prefers_scored_addresses() {
        let person: Person = serde_json::from_value(serde_json::json!({
            "displayName": "Ada Lovelace",
            "scoredEmailAddresses": [{ "address": "ada@contoso.com" }],
            "userPrincipalName": "ada.l@contoso.onmicrosoft.com"
        }))
        .unwrap();
        assert_eq!(person.best_email(), Some("ada@contoso.com"));

        let person: Person = serde_json::from_value(serde_json::json!({
            "displayName": "Ada Lovelace",
            "userPrincipalName": "ada.l@contoso.onmicrosoft.com"
        }))
        .unwrap();
        assert_eq!(person.best_email(), Some("ada.l@contoso.onmicrosoft.com"));
    }

    #[test]
    fn test_user_effective_email_falls_back_to_upn() {
        let user: User = serde_json::from_value(serde_json::json!({
            "displayName": "Grace Hopper",
            "mail": null,
            "userPrincipalName": "grace@contoso.com"
        }))
        .unwrap();
        assert_eq!(user.effective_email(), Some("grace@contoso.com"));
    }
}
