use std::time::Duration;

pub const REALTIME_SESSIONS_URL: &str = "https://api.openai.com/v1/realtime/sessions";
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";
pub const DEFAULT_REALTIME_VOICE: &str = "coral";
pub const DEFAULT_AGENT_MODEL: &str = "gpt-4o";

pub const DEFAULT_TOOL_COMMAND: &str = "npx";
pub const DEFAULT_TOOL_ARGS: &[&str] = &["@gongrzhe/server-gmail-autoauth-mcp"];
pub const TOOL_SERVER_NAME: &str = "gmail";

/// Locations probed for the Gmail OAuth client credentials.
pub const CREDENTIAL_PATHS: &[&str] = &[
    "~/.gmail-mcp/gcp-oauth.keys.json",
    "gcp-oauth.keys.json",
];

pub const EXPECTED_EMAIL_COUNT: usize = 5;
pub const MAX_AGENT_TURNS: usize = 10;

/// First-time authentication can open a browser flow, so the handshake
/// deadline is deliberately generous.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);
pub const TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(60);
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
pub const SESSION_DEADLINE: Duration = Duration::from_secs(240);

pub const MAILBOX_INSTRUCTIONS: &str = r#"
You are a Gmail Email Agent that is triggered once when the application loads. Your task is to:

1. Fetch the **last 5 emails** from the user's Gmail inbox.
2. For each email, extract the following fields:
   - **email_id**: the unique Gmail message ID
   - **summary**: a brief summary of the email body, written in English (also consider the attachments if they seem relevant)
   - **email_content**: the full plain-text body of the email
   - **sender**: the email address of the sender
   - **recipients**: a list of all recipient email addresses (To, Cc, Bcc)
   - **received_date**: the timestamp when the email was received, in ISO-8601 format (e.g. "2025-04-25T14:30:00Z")
   - **subject**: the email's subject line
   - **attachments**: a list of attachment metadata objects, each containing:
     - **filename**: the attachment's file name
     - **mime_type**: the attachment's MIME type
     (Do not download or open attachments; only list their filenames and types.)

3. Return the result strictly as valid JSON, with no comments or extra fields, in the following structure:

{
  "emails": [
    {
      "email_id": "STRING",
      "summary": "STRING",
      "email_content": "STRING",
      "sender": "STRING",
      "recipients": ["STRING", ...],
      "received_date": "STRING",
      "subject": "STRING",
      "attachments": [
        {
          "filename": "STRING",
          "mime_type": "STRING"
        }
      ]
    }
  ]
}

Important:
- Only retrieve the last 5 messages in descending order by received date.
- Ensure the JSON is well-formed and parsable.
"#;
