//! Principals, sessions and the identity provider seam
use crate::document::{Document, Fields};
use crate::error::{MarketError, SchemaError, ValidationError};
use crate::store::{Collection, DocumentStore, InsertOutcome, UpdateOutcome};
use crate::types::TimeStamp;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    #[serde(rename = "farmer")]
    Producer,
    #[serde(rename = "buyer")]
    Purchaser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "farmer",
            Role::Purchaser => "buyer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "farmer" => Ok(Role::Producer),
            "buyer" => Ok(Role::Purchaser),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    #[serde(rename = "fullName")]
    pub display_name: String,
    pub email: String,
    #[serde(rename = "userType")]
    pub role: Role,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub created_at: TimeStamp<Utc>,
    pub updated_at: Option<TimeStamp<Utc>>,
}

impl Principal {
    pub fn from_document(doc: &Document) -> Result<Self, SchemaError> {
        Ok(Self {
            id: doc.id.clone(),
            display_name: doc.text("fullName")?.to_string(),
            email: doc.text("email")?.to_string(),
            role: doc.parsed("userType")?,
            location: doc.optional_text("location")?.map(str::to_string),
            phone: doc.optional_text("phone")?.map(str::to_string),
            created_at: doc.timestamp("createdAt")?,
            updated_at: doc.optional_timestamp("updatedAt")?,
        })
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("fullName".into(), self.display_name.clone().into());
        fields.insert("email".into(), self.email.clone().into());
        fields.insert("userType".into(), self.role.as_str().into());
        fields.insert("createdAt".into(), (&self.created_at).into());
        if let Some(location) = &self.location {
            fields.insert("location".into(), location.clone().into());
        }
        if let Some(phone) = &self.phone {
            fields.insert("phone".into(), phone.clone().into());
        }
        fields
    }
}

/// Profile captured at sign-up.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

/// The only profile fields an owner may change. Email and role are fixed at sign-up.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    display_name: Option<String>,
    location: Option<String>,
    phone: Option<String>,
}

impl ProfileUpdate {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }
    pub fn set_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
    pub fn set_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }
}

/// Authenticates transport-level sessions. Token issuance happens elsewhere.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Stable principal id for an authenticated session, `None` otherwise.
    async fn authenticate(&self, session_token: &str) -> anyhow::Result<Option<String>>;

    async fn sign_out(&self, session_token: &str) -> anyhow::Result<()>;
}

/// In-process provider mapping session tokens to principal ids.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<String, String>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, session_token: &str, principal_id: &str) -> anyhow::Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow::anyhow!("session table lock poisoned"))?;
        sessions.insert(session_token.to_string(), principal_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for SessionTable {
    async fn authenticate(&self, session_token: &str) -> anyhow::Result<Option<String>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| anyhow::anyhow!("session table lock poisoned"))?;
        Ok(sessions.get(session_token).cloned())
    }

    async fn sign_out(&self, session_token: &str) -> anyhow::Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow::anyhow!("session table lock poisoned"))?;
        sessions.remove(session_token);
        Ok(())
    }
}

/// The signed-in principal, handed to every mutating call.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    principal: Principal,
}

impl Session {
    pub fn new(token: impl Into<String>, principal: Principal) -> Self {
        Self {
            token: token.into(),
            principal,
        }
    }
    pub fn principal(&self) -> &Principal {
        &self.principal
    }
    pub fn principal_id(&self) -> &str {
        &self.principal.id
    }
    pub fn role(&self) -> Role {
        self.principal.role
    }
    pub(crate) fn require_role(&self, role: Role, action: &str) -> Result<(), MarketError> {
        if self.principal.role != role {
            return Err(MarketError::unauthorized(&self.principal.id, action));
        }
        Ok(())
    }
}

pub struct IdentityResolver {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn IdentityProvider>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn DocumentStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { store, provider }
    }

    async fn load(&self, principal_id: &str) -> Result<Option<Principal>, MarketError> {
        match self.store.get(Collection::Users, principal_id).await? {
            Some(doc) => Ok(Some(Principal::from_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Creates the profile for a freshly authenticated principal.
    pub async fn register(
        &self,
        session_token: &str,
        profile: NewPrincipal,
    ) -> Result<Principal, MarketError> {
        let Some(principal_id) = self.provider.authenticate(session_token).await? else {
            return Err(MarketError::unauthorized("anonymous", "register a profile"));
        };
        if profile.display_name.trim().is_empty() {
            return Err(ValidationError::EmptyField("display name").into());
        }
        if profile.email.trim().is_empty() {
            return Err(ValidationError::EmptyField("email").into());
        }
        if self.store.get(Collection::Users, &principal_id).await?.is_some() {
            return Err(ValidationError::ProfileExists(principal_id).into());
        }

        let principal = Principal {
            id: principal_id,
            display_name: profile.display_name,
            email: profile.email,
            role: profile.role,
            location: None,
            phone: None,
            created_at: TimeStamp::new(),
            updated_at: None,
        };
        // a concurrent registration can land between the check above and this write
        if self
            .store
            .insert(Collection::Users, &principal.id, principal.to_fields())
            .await?
            == InsertOutcome::Exists
        {
            return Err(ValidationError::ProfileExists(principal.id).into());
        }

        info!(principal = %principal.id, role = %principal.role, "profile registered");
        Ok(principal)
    }

    /// `None` when the session is not authenticated or has no profile yet.
    pub async fn resolve(&self, session_token: &str) -> Result<Option<Principal>, MarketError> {
        let Some(principal_id) = self.provider.authenticate(session_token).await? else {
            debug!("session is not authenticated");
            return Ok(None);
        };
        let principal = self.load(&principal_id).await?;
        if principal.is_none() {
            debug!(principal = %principal_id, "authenticated principal has no profile");
        }
        Ok(principal)
    }

    pub async fn begin_session(&self, session_token: &str) -> Result<Option<Session>, MarketError> {
        Ok(self
            .resolve(session_token)
            .await?
            .map(|principal| Session::new(session_token, principal)))
    }

    /// Applies `update` to the caller's own profile and refreshes the session with the result.
    pub async fn update_profile(
        &self,
        session: &mut Session,
        principal_id: &str,
        update: ProfileUpdate,
    ) -> Result<Principal, MarketError> {
        if session.principal_id() != principal_id {
            warn!(actor = %session.principal_id(), target = %principal_id, "profile update refused");
            return Err(MarketError::unauthorized(
                session.principal_id(),
                format!("update the profile of {principal_id}"),
            ));
        }

        let mut patch = Fields::new();
        if let Some(name) = update.display_name {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyField("display name").into());
            }
            patch.insert("fullName".into(), name.into());
        }
        if let Some(location) = update.location {
            patch.insert("location".into(), location.into());
        }
        if let Some(phone) = update.phone {
            patch.insert("phone".into(), phone.into());
        }
        patch.insert("updatedAt".into(), (&TimeStamp::new()).into());

        if self.store.update(Collection::Users, principal_id, patch).await? == UpdateOutcome::Missing {
            return Err(MarketError::not_found("principal", principal_id));
        }
        let principal = self
            .load(principal_id)
            .await?
            .ok_or_else(|| MarketError::not_found("principal", principal_id))?;

        info!(principal = %principal_id, "profile updated");
        session.principal = principal.clone();
        Ok(principal)
    }

    /// Ends the session with the provider. The session value is consumed.
    pub async fn sign_out(&self, session: Session) -> Result<(), MarketError> {
        self.provider.sign_out(&session.token).await?;
        info!(principal = %session.principal.id, "signed out");
        Ok(())
    }
}
