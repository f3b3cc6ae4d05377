//! Blocking REST client for Supabase storage and PostgREST tables.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::Credentials;
use crate::publish::{BucketSpec, LibraryRecord, RemoteError, Storage, Table};

#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl RemoteError for SupabaseError {
    /// Duplicate-resource errors from idempotent create/upload calls.
    fn is_already_exists(&self) -> bool {
        match self {
            SupabaseError::Status { status, message } => {
                let msg = message.to_lowercase();
                msg.contains("already exists") || msg.contains("duplicate") || *status == 409
            }
            _ => false,
        }
    }
}

impl From<ureq::Error> for SupabaseError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(status, response) => SupabaseError::Status {
                status,
                message: response
                    .into_string()
                    .unwrap_or_else(|_| "<unreadable body>".to_string()),
            },
            ureq::Error::Transport(t) => SupabaseError::Transport(t.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BucketInfo {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
}

pub struct SupabaseClient {
    agent: ureq::Agent,
    base_url: String,
    key: String,
}

impl SupabaseClient {
    pub fn new(creds: &Credentials) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(15))
            .timeout(Duration::from_secs(120))
            .build();
        Self {
            agent,
            base_url: creds.url.trim_end_matches('/').to_string(),
            key: creds.service_key.clone(),
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &format!("{}{}", self.base_url, path))
            .set("apikey", &self.key)
            .set("Authorization", &format!("Bearer {}", self.key))
    }
}

impl Storage for SupabaseClient {
    type Error = SupabaseError;

    fn bucket_exists(&self, bucket: &str) -> Result<bool, SupabaseError> {
        let response = self.request("GET", "/storage/v1/bucket").call()?;
        let buckets: Vec<BucketInfo> = response
            .into_json()
            .map_err(|e| SupabaseError::Decode(e.to_string()))?;
        Ok(buckets.iter().any(|b| b.name == bucket || b.id == bucket))
    }

    fn create_bucket(&self, spec: &BucketSpec) -> Result<(), SupabaseError> {
        self.request("POST", "/storage/v1/bucket")
            .send_json(json!({
                "id": spec.name,
                "name": spec.name,
                "public": spec.public,
                "file_size_limit": spec.file_size_limit,
                "allowed_mime_types": spec.allowed_mime_types,
            }))?;
        Ok(())
    }

    fn upload(
        &self,
        bucket: &str,
        remote_path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), SupabaseError> {
        self.request("POST", &format!("/storage/v1/object/{}/{}", bucket, remote_path))
            .set("Content-Type", content_type)
            .set("x-upsert", "true")
            .send_bytes(data)?;
        Ok(())
    }
}

impl Table for SupabaseClient {
    type Error = SupabaseError;

    fn upsert(
        &self,
        table: &str,
        conflict_key: &str,
        record: &LibraryRecord,
    ) -> Result<(), SupabaseError> {
        let row: Value =
            serde_json::to_value(record).map_err(|e| SupabaseError::Decode(e.to_string()))?;
        self.request("POST", &format!("/rest/v1/{}", table))
            .query("on_conflict", conflict_key)
            .set("Prefer", "resolution=merge-duplicates,return=minimal")
            .send_json(row)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_duplicate_errors() {
        let dup = SupabaseError::Status {
            status: 400,
            message: r#"{"statusCode":"409","error":"Duplicate","message":"The resource already exists"}"#
                .to_string(),
        };
        assert!(dup.is_already_exists());

        let conflict = SupabaseError::Status {
            status: 409,
            message: String::new(),
        };
        assert!(conflict.is_already_exists());

        let denied = SupabaseError::Status {
            status: 403,
            message: "new row violates row-level security policy".to_string(),
        };
        assert!(!denied.is_already_exists());
        assert!(!SupabaseError::Transport("connection refused".to_string()).is_already_exists());
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let client = SupabaseClient::new(&Credentials {
            url: "https://example.supabase.co/".to_string(),
            service_key: "secret".to_string(),
        });
        assert_eq!(client.base_url, "https://example.supabase.co");
    }
}
