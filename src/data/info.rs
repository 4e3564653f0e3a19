use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::DataError;

// -- Content addresses --------------------------------------------------------

macro_rules! content_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Wrap raw identifier bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Derive an identifier by hashing `parts` in order.
            pub fn digest(parts: &[&[u8]]) -> Self {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update((part.len() as u64).to_be_bytes());
                    hasher.update(part);
                }
                Self(hasher.finalize().into())
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = DataError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes)
                    .map_err(|_| DataError::InvalidId(s.to_string()))?;
                Ok(Self(bytes))
            }
        }
    };
}

content_id!(
    /// Backend container identifier; one container backs one bucket.
    ContainerId
);

content_id!(
    /// Backend object identifier, unique within its container.
    ObjectId
);

/// Full backend address of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub container: ContainerId,
    pub object: ObjectId,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.object)
    }
}

// -- System objects -----------------------------------------------------------

/// Reserved keys under which bucket configuration is persisted as ordinary
/// objects inside the bucket's own container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemObject {
    Settings,
    Cors,
    NotificationConfiguration,
}

impl SystemObject {
    pub const ALL: [SystemObject; 3] = [
        SystemObject::Settings,
        SystemObject::Cors,
        SystemObject::NotificationConfiguration,
    ];

    /// The reserved object key.
    pub const fn key(self) -> &'static str {
        match self {
            SystemObject::Settings => ".s3-settings",
            SystemObject::Cors => ".s3-cors",
            SystemObject::NotificationConfiguration => ".s3-notifications",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|obj| obj.key() == key)
    }
}

/// Whether `key` is reserved for bucket configuration and must not be used
/// for user objects.
pub fn is_reserved_key(key: &str) -> bool {
    SystemObject::from_key(key).is_some()
}

// -- Buckets ------------------------------------------------------------------

/// Basic bucket data as known to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketInfo {
    /// Client-visible bucket name.
    pub name: String,
    /// Container holding the bucket's objects.
    pub container_id: ContainerId,
    pub owner: String,
    pub created: DateTime<Utc>,
    pub location_constraint: String,
    /// Set at creation time only.
    pub object_lock_enabled: bool,
}

impl BucketInfo {
    /// System name of the bucket settings object.
    pub fn settings_object_name(&self) -> &'static str {
        SystemObject::Settings.key()
    }

    /// System name of the bucket CORS configuration object.
    pub fn cors_object_name(&self) -> &'static str {
        SystemObject::Cors.key()
    }

    pub fn notification_configuration_object_name(&self) -> &'static str {
        SystemObject::NotificationConfiguration.key()
    }
}

// -- Objects ------------------------------------------------------------------

/// S3 view of one stored object version.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub container_id: ContainerId,
    pub is_dir: bool,
    pub is_delete_marker: bool,

    pub bucket: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    /// Upload completion time, served as Last-Modified.
    pub created: DateTime<Utc>,
    /// Hex payload hash, served as the ETag.
    pub hash_sum: String,
    pub owner: String,
    pub headers: HashMap<String, String>,
}

impl ObjectInfo {
    /// Version token of this object.
    pub fn version(&self) -> String {
        self.id.to_string()
    }

    /// Object name used as a cache key.
    pub fn nice_name(&self) -> String {
        format!("{}/{}", self.bucket, self.name)
    }

    pub fn address(&self) -> Address {
        Address {
            container: self.container_id,
            object: self.id,
        }
    }

    /// Quoted entity tag as sent in the `ETag` header.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.hash_sum)
    }
}

// -- Bucket settings ----------------------------------------------------------

/// Versioning and lock settings, stored as JSON in the settings object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketSettings {
    /// No settings object has been written yet.
    #[serde(skip)]
    pub is_none_status: bool,
    #[serde(default)]
    pub versioning_enabled: bool,
    #[serde(default)]
    pub lock_configuration: Option<ObjectLockConfiguration>,
}

impl BucketSettings {
    /// Settings of a bucket that never had any written.
    pub fn none() -> Self {
        Self {
            is_none_status: true,
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, DataError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, DataError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// `ObjectLockConfiguration` as accepted by `PUT ?object-lock`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectLockConfiguration {
    #[serde(
        rename = "ObjectLockEnabled",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub object_lock_enabled: Option<String>,
    #[serde(rename = "Rule", default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<ObjectLockRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectLockRule {
    #[serde(
        rename = "DefaultRetention",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_retention: Option<DefaultRetention>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultRetention {
    #[serde(rename = "Mode")]
    pub mode: String,
    #[serde(rename = "Days", default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    #[serde(rename = "Years", default, skip_serializing_if = "Option::is_none")]
    pub years: Option<u32>,
}

impl ObjectLockConfiguration {
    pub fn from_xml(data: &[u8]) -> Result<Self, DataError> {
        let text = std::str::from_utf8(data)
            .map_err(|e| DataError::Invalid(format!("configuration is not UTF-8: {e}")))?;
        let config: Self = quick_xml::de::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the S3 rules for a lock configuration document.
    pub fn validate(&self) -> Result<(), DataError> {
        if let Some(enabled) = &self.object_lock_enabled {
            if enabled != "Enabled" {
                return Err(DataError::Invalid(format!(
                    "invalid ObjectLockEnabled value: {enabled}"
                )));
            }
        }
        let Some(retention) = self.rule.as_ref().and_then(|r| r.default_retention.as_ref())
        else {
            return Ok(());
        };
        if retention.mode != "GOVERNANCE" && retention.mode != "COMPLIANCE" {
            return Err(DataError::Invalid(format!(
                "invalid retention mode: {}",
                retention.mode
            )));
        }
        match (retention.days, retention.years) {
            (Some(d), None) if d > 0 => Ok(()),
            (None, Some(y)) if y > 0 => Ok(()),
            _ => Err(DataError::Invalid(
                "default retention requires exactly one positive Days or Years".to_string(),
            )),
        }
    }
}

// -- CORS ---------------------------------------------------------------------

/// Bucket CORS rules, stored as XML in the CORS object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename = "CORSConfiguration")]
pub struct CorsConfiguration {
    #[serde(rename = "CORSRule", default)]
    pub cors_rules: Vec<CorsRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CorsRule {
    #[serde(rename = "ID", default)]
    pub id: Option<String>,
    #[serde(rename = "AllowedHeader", default)]
    pub allowed_headers: Vec<String>,
    #[serde(rename = "AllowedMethod", default)]
    pub allowed_methods: Vec<String>,
    #[serde(rename = "AllowedOrigin", default)]
    pub allowed_origins: Vec<String>,
    #[serde(rename = "ExposeHeader", default)]
    pub expose_headers: Vec<String>,
    #[serde(rename = "MaxAgeSeconds", default)]
    pub max_age_seconds: Option<u32>,
}

const CORS_METHODS: &[&str] = &["GET", "PUT", "HEAD", "POST", "DELETE"];

impl CorsConfiguration {
    pub fn from_xml(data: &[u8]) -> Result<Self, DataError> {
        let text = std::str::from_utf8(data)
            .map_err(|e| DataError::Invalid(format!("configuration is not UTF-8: {e}")))?;
        let config: Self = quick_xml::de::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_xml(&self) -> String {
        crate::xml::render_cors_configuration(self)
    }

    /// Every rule needs at least one method and origin; methods are limited
    /// to the five S3 allows.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.cors_rules.is_empty() {
            return Err(DataError::Invalid(
                "CORS configuration must contain at least one rule".to_string(),
            ));
        }
        for rule in &self.cors_rules {
            if rule.allowed_methods.is_empty() || rule.allowed_origins.is_empty() {
                return Err(DataError::Invalid(
                    "each CORS rule needs an AllowedMethod and an AllowedOrigin".to_string(),
                ));
            }
            if let Some(bad) = rule
                .allowed_methods
                .iter()
                .find(|m| !CORS_METHODS.contains(&m.as_str()))
            {
                return Err(DataError::Invalid(format!(
                    "unsupported CORS method: {bad}"
                )));
            }
        }
        Ok(())
    }
}
