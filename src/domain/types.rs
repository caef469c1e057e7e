use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

/// Metadata for a single attachment; contents are never fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttachmentInfo {
    pub filename: String,
    pub mime_type: String,
}

/// One inbox message as the agent must report it. Every field is required;
/// `recipients` and `attachments` may be empty but must be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmailRecord {
    pub email_id: String,
    pub summary: String,
    pub email_content: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub received_date: String,
    pub subject: String,
    pub attachments: Vec<AttachmentInfo>,
}

/// The validated final payload: exactly the contracted number of messages,
/// newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MailboxReport {
    pub emails: Vec<EmailRecord>,
}

#[derive(Debug, Error)]
pub enum ContractViolation {
    #[error("final answer does not match the required shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("expected exactly {expected} emails, got {actual}")]
    Count { expected: usize, actual: usize },
    #[error("email '{email_id}' carries an unparseable received_date {value:?}")]
    Date { email_id: String, value: String },
    #[error("emails are not ordered newest-first (violation at position {position})")]
    Order { position: usize },
}

impl MailboxReport {
    /// Parse and validate a candidate final answer against the output contract.
    pub fn parse(value: Value, expected: usize) -> Result<Self, ContractViolation> {
        let report: MailboxReport = serde_json::from_value(value)?;
        report.ensure_contract(expected)?;
        Ok(report)
    }

    fn ensure_contract(&self, expected: usize) -> Result<(), ContractViolation> {
        if self.emails.len() != expected {
            return Err(ContractViolation::Count {
                expected,
                actual: self.emails.len(),
            });
        }

        let mut previous: Option<DateTime<FixedOffset>> = None;
        for (position, email) in self.emails.iter().enumerate() {
            let received = DateTime::parse_from_rfc3339(&email.received_date).map_err(|_| {
                ContractViolation::Date {
                    email_id: email.email_id.clone(),
                    value: email.received_date.clone(),
                }
            })?;
            if let Some(prior) = previous {
                if received > prior {
                    return Err(ContractViolation::Order { position });
                }
            }
            previous = Some(received);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email(id: &str, received: &str) -> Value {
        json!({
            "email_id": id,
            "summary": "summary",
            "email_content": "body",
            "sender": "sender@example.com",
            "recipients": ["me@example.com"],
            "received_date": received,
            "subject": "subject",
            "attachments": []
        })
    }

    #[test]
    fn accepts_exactly_five_sorted_emails() {
        let payload = json!({
            "emails": [
                email("a", "2025-04-25T14:30:00Z"),
                email("b", "2025-04-25T12:00:00Z"),
                email("c", "2025-04-24T09:00:00Z"),
                email("d", "2025-04-23T09:00:00Z"),
                email("e", "2025-04-22T09:00:00Z"),
            ]
        });

        let report = MailboxReport::parse(payload, 5).expect("contract holds");
        assert_eq!(report.emails.len(), 5);
        assert_eq!(report.emails[0].email_id, "a");
    }

    #[test]
    fn rejects_wrong_count() {
        let payload = json!({ "emails": [email("a", "2025-04-25T14:30:00Z")] });
        let err = MailboxReport::parse(payload, 5).expect_err("count mismatch");
        assert!(matches!(
            err,
            ContractViolation::Count {
                expected: 5,
                actual: 1
            }
        ));
    }

    #[test]
    fn rejects_out_of_order_emails() {
        let payload = json!({
            "emails": [
                email("a", "2025-04-22T09:00:00Z"),
                email("b", "2025-04-25T12:00:00Z"),
            ]
        });
        let err = MailboxReport::parse(payload, 2).expect_err("order violated");
        assert!(matches!(err, ContractViolation::Order { position: 1 }));
    }

    #[test]
    fn rejects_missing_field() {
        let mut broken = email("a", "2025-04-25T14:30:00Z");
        broken.as_object_mut().unwrap().remove("subject");
        let payload = json!({ "emails": [broken] });
        let err = MailboxReport::parse(payload, 1).expect_err("missing field");
        assert!(matches!(err, ContractViolation::Shape(_)));
    }

    #[test]
    fn rejects_unparseable_date() {
        let payload = json!({ "emails": [email("a", "yesterday")] });
        let err = MailboxReport::parse(payload, 1).expect_err("bad date");
        assert!(matches!(err, ContractViolation::Date { .. }));
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let payload = json!({
            "emails": [
                email("a", "2025-04-25T14:30:00Z"),
                email("b", "2025-04-25T14:30:00Z"),
            ]
        });
        assert!(MailboxReport::parse(payload, 2).is_ok());
    }
}
