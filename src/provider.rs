//! Provider catalogue: which providers exist and what credentials they need.

use serde::{Deserialize, Serialize};

/// Video provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Kling AI (Kuaishou), access-key authenticated.
    #[serde(rename = "kling")]
    Kling,
    /// MiniMax Hailuo, API key plus group id.
    #[serde(rename = "minmax")]
    MiniMax,
}

impl ProviderKind {
    /// All provider kinds, in the order the service lists them.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Kling, ProviderKind::MiniMax];

    /// Returns the wire identifier used by the generation service.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Kling => "kling",
            Self::MiniMax => "minmax",
        }
    }

    /// Returns the display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Kling => "Kling",
            Self::MiniMax => "Minimax",
        }
    }

    /// Returns the credential family this provider authenticates with.
    pub fn family(&self) -> ProviderFamily {
        match self {
            Self::Kling => ProviderFamily::AccessKey,
            Self::MiniMax => ProviderFamily::ApiKeyGroup,
        }
    }

    /// Looks up a provider by wire identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id.trim())
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Shape of the credentials a provider expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// Access key id plus access key secret.
    AccessKey,
    /// API key plus group id.
    ApiKeyGroup,
}

impl ProviderFamily {
    /// Fields that must be non-empty for this family.
    pub fn required_fields(&self) -> &'static [CredentialField] {
        match self {
            Self::AccessKey => &[CredentialField::AccessKeyId, CredentialField::AccessKeySecret],
            Self::ApiKeyGroup => &[CredentialField::ApiKey, CredentialField::GroupId],
        }
    }
}

/// A single credential input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CredentialField {
    /// Access key id.
    AccessKeyId,
    /// Access key secret.
    AccessKeySecret,
    /// API key.
    ApiKey,
    /// Group id.
    GroupId,
}

impl CredentialField {
    /// Human-readable label for prompts and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AccessKeyId => "access key ID",
            Self::AccessKeySecret => "access key secret",
            Self::ApiKey => "API key",
            Self::GroupId => "group ID",
        }
    }
}

/// A provider as advertised by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Wire identifier (e.g. `"kling"`).
    pub id: String,
    /// Display name (e.g. `"Kling"`).
    pub name: String,
}

impl ProviderDescriptor {
    /// Creates a descriptor.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Descriptors for every built-in provider kind.
    pub fn builtin() -> Vec<Self> {
        ProviderKind::ALL
            .into_iter()
            .map(|k| Self::new(k.id(), k.display_name()))
            .collect()
    }

    /// Returns the provider kind, if the id is recognized.
    pub fn kind(&self) -> Option<ProviderKind> {
        ProviderKind::from_id(&self.id)
    }

    /// Credential fields required by this provider (empty when unrecognized).
    pub fn required_fields(&self) -> &'static [CredentialField] {
        self.kind()
            .map(|k| k.family().required_fields())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProviderList {
    pub providers: Vec<ProviderDescriptor>,
}
