//! Credential resolution: raw form fields to a provider-specific bundle.

use crate::error::ValidationError;
use crate::provider::{CredentialField, ProviderFamily, ProviderKind};

/// Raw credential fields as entered by the user, possibly empty.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawCredentials {
    /// Kling access key id.
    pub access_key_id: String,
    /// Kling access key secret.
    pub access_key_secret: String,
    /// MiniMax API key.
    pub api_key: String,
    /// MiniMax group id.
    pub group_id: String,
}

impl RawCredentials {
    /// Creates an empty set of fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the access key id.
    pub fn with_access_key_id(mut self, value: impl Into<String>) -> Self {
        self.access_key_id = value.into();
        self
    }

    /// Sets the access key secret.
    pub fn with_access_key_secret(mut self, value: impl Into<String>) -> Self {
        self.access_key_secret = value.into();
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, value: impl Into<String>) -> Self {
        self.api_key = value.into();
        self
    }

    /// Sets the group id.
    pub fn with_group_id(mut self, value: impl Into<String>) -> Self {
        self.group_id = value.into();
        self
    }

    fn field(&self, field: CredentialField) -> &str {
        match field {
            CredentialField::AccessKeyId => &self.access_key_id,
            CredentialField::AccessKeySecret => &self.access_key_secret,
            CredentialField::ApiKey => &self.api_key,
            CredentialField::GroupId => &self.group_id,
        }
    }
}

impl std::fmt::Debug for RawCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &redact(&self.access_key_secret))
            .field("api_key", &redact(&self.api_key))
            .field("group_id", &self.group_id)
            .finish()
    }
}

/// Normalized credentials for exactly one provider family.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialBundle {
    /// Access key id plus secret (Kling).
    AccessKey {
        /// Access key id.
        access_key_id: String,
        /// Access key secret.
        access_key_secret: String,
    },
    /// API key plus group id (MiniMax).
    ApiKeyGroup {
        /// API key.
        api_key: String,
        /// Group id.
        group_id: String,
    },
}

impl CredentialBundle {
    /// Returns the family this bundle belongs to.
    pub fn family(&self) -> ProviderFamily {
        match self {
            Self::AccessKey { .. } => ProviderFamily::AccessKey,
            Self::ApiKeyGroup { .. } => ProviderFamily::ApiKeyGroup,
        }
    }

    /// Collapses the bundle into the request fields the service expects.
    ///
    /// The service always receives the primary key as `apiKey`; the access
    /// key id doubles as that value for access-key providers.
    pub fn wire_fields(&self) -> WireCredentials {
        match self {
            Self::AccessKey {
                access_key_id,
                access_key_secret,
            } => WireCredentials {
                api_key: access_key_id.clone(),
                access_key_secret: Some(access_key_secret.clone()),
                group_id: None,
            },
            Self::ApiKeyGroup { api_key, group_id } => WireCredentials {
                api_key: api_key.clone(),
                access_key_secret: None,
                group_id: Some(group_id.clone()),
            },
        }
    }
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessKey {
                access_key_id,
                access_key_secret,
            } => f
                .debug_struct("AccessKey")
                .field("access_key_id", access_key_id)
                .field("access_key_secret", &redact(access_key_secret))
                .finish(),
            Self::ApiKeyGroup { api_key, group_id } => f
                .debug_struct("ApiKeyGroup")
                .field("api_key", &redact(api_key))
                .field("group_id", group_id)
                .finish(),
        }
    }
}

/// Credential fields as they appear in the generation request body.
#[derive(Clone, PartialEq, Eq)]
pub struct WireCredentials {
    /// Sent as `apiKey`: the access key id or the API key.
    pub api_key: String,
    /// Sent as `accessKeySecret`, access-key providers only.
    pub access_key_secret: Option<String>,
    /// Sent as `groupId`, API-key providers only.
    pub group_id: Option<String>,
}

impl std::fmt::Debug for WireCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireCredentials")
            .field("api_key", &redact(&self.api_key))
            .field(
                "access_key_secret",
                &self.access_key_secret.as_deref().map(redact),
            )
            .field("group_id", &self.group_id)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Resolves raw fields into the bundle required by `provider_id`.
///
/// Every empty required field is reported, in declaration order. Values are
/// trimmed before use.
pub fn resolve(
    provider_id: &str,
    raw: &RawCredentials,
) -> std::result::Result<CredentialBundle, ValidationError> {
    let kind = ProviderKind::from_id(provider_id)
        .ok_or_else(|| ValidationError::UnknownProvider(provider_id.to_string()))?;
    let family = kind.family();

    let missing: Vec<CredentialField> = family
        .required_fields()
        .iter()
        .copied()
        .filter(|f| raw.field(*f).trim().is_empty())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingCredentials {
            provider: kind.id().to_string(),
            fields: missing,
        });
    }

    let value = |f: CredentialField| raw.field(f).trim().to_string();
    Ok(match family {
        ProviderFamily::AccessKey => CredentialBundle::AccessKey {
            access_key_id: value(CredentialField::AccessKeyId),
            access_key_secret: value(CredentialField::AccessKeySecret),
        },
        ProviderFamily::ApiKeyGroup => CredentialBundle::ApiKeyGroup {
            api_key: value(CredentialField::ApiKey),
            group_id: value(CredentialField::GroupId),
        },
    })
}
