use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Platform role attached to every identity. Fixed enumeration; there is no
/// role hierarchy at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Farmer,
    Consumer,
    Warehouse,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Consumer => "consumer",
            Role::Warehouse => "warehouse",
            Role::Admin => "admin",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "farmer" => Ok(Role::Farmer),
            "consumer" => Ok(Role::Consumer),
            "warehouse" => Ok(Role::Warehouse),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pincode: Option<String>,
}

/// The reconciled view of the signed-in user. Carries contact and locale
/// attributes only; farm/warehouse/product ownership lives outside this layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub aadhaar: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            name: None,
            email: None,
            phone: None,
            aadhaar: None,
            verified: false,
            locale: None,
            location: Location::default(),
            avatar_url: None,
        }
    }

    pub fn matches_email(&self, email: &str) -> bool {
        self.email.as_deref().map(|e| e.eq_ignore_ascii_case(email.trim())).unwrap_or(false)
    }

    pub fn matches_phone(&self, phone: &str) -> bool {
        self.phone.as_deref().map(|p| p == phone.trim()).unwrap_or(false)
    }

    pub fn matches_aadhaar(&self, aadhaar: &str) -> bool {
        self.aadhaar.as_deref().map(|a| a == aadhaar.trim()).unwrap_or(false)
    }
}

/// Partial update over the small mutable field set. Absent fields are left
/// untouched by `merge_into`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.avatar_url.is_none()
            && self.locale.is_none()
            && self.location.is_none()
    }

    /// The subset the remote auth service accepts as account metadata
    /// (name, email, phone, avatar). Locale and location stay profile-only.
    pub fn auth_metadata(&self) -> ProfileUpdate {
        ProfileUpdate {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            avatar_url: self.avatar_url.clone(),
            locale: None,
            location: None,
        }
    }

    pub fn merge_into(&self, user: &mut UserIdentity) {
        if let Some(v) = &self.name { user.name = Some(v.clone()); }
        if let Some(v) = &self.email { user.email = Some(v.clone()); }
        if let Some(v) = &self.phone { user.phone = Some(v.clone()); }
        if let Some(v) = &self.avatar_url { user.avatar_url = Some(v.clone()); }
        if let Some(v) = &self.locale { user.locale = Some(v.clone()); }
        if let Some(v) = &self.location { user.location = v.clone(); }
    }
}
