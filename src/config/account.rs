//! Per-account configuration
//!
//! Each account is stored as its own TOML file. Ids discovered at runtime
//! are written back immediately so a restart resumes from the last known
//! state.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{DateBounds, ResourceKind};
use crate::utils::mask;

/// Country codes served by the portal
pub const COUNTRIES: &[(&str, &str)] = &[
    ("ae", "United Arab Emirates"),
    ("al", "Albania"),
    ("am", "Armenia"),
    ("ao", "Angola"),
    ("ar", "Argentina"),
    ("az", "Azerbaijan"),
    ("ba", "Bosnia and Herzegovina"),
    ("bb", "Barbados"),
    ("be", "Belgium"),
    ("bo", "Bolivia"),
    ("br", "Brazil"),
    ("bs", "The Bahamas"),
    ("bz", "Belize"),
    ("ca", "Canada"),
    ("cd", "The Democratic Republic of the Congo"),
    ("cl", "Chile"),
    ("cm", "Cameroon"),
    ("co", "Colombia"),
    ("cv", "Cabo Verde"),
    ("cw", "Curacao"),
    ("cy", "Cyprus"),
    ("ec", "Ecuador"),
    ("es", "Spain and Andorra"),
    ("et", "Ethiopia"),
    ("fr", "France"),
    ("gb", "United Kingdom"),
    ("gr", "Greece"),
    ("gy", "Guyana"),
    ("hr", "Croatia"),
    ("ie", "Ireland"),
    ("il", "Israel, Jerusalem, The West Bank, and Gaza"),
    ("ir", "Iran"),
    ("it", "Italy"),
    ("jm", "Jamaica"),
    ("ke", "Kenya"),
    ("kv", "Kosovo"),
    ("mk", "North Macedonia"),
    ("mx", "Mexico"),
    ("nl", "The Netherlands"),
    ("pe", "Peru"),
    ("pt", "Portugal"),
    ("py", "Paraguay"),
    ("rs", "Serbia"),
    ("rw", "Rwanda"),
    ("sn", "Senegal"),
    ("sr", "Suriname"),
    ("tr", "Turkiye"),
    ("tt", "Trinidad and Tobago"),
    ("tz", "Tanzania"),
    ("ug", "Uganda"),
    ("us", "United States (Domestic Visa Renewal)"),
    ("uy", "Uruguay"),
    ("za", "South Africa"),
    ("zm", "Zambia"),
];

/// Look up the display name of a country code
pub fn country_name(code: &str) -> Option<&'static str> {
    COUNTRIES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Account configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Login email
    pub email: String,

    /// Login password
    pub password: String,

    /// Two-letter portal country code
    pub country: String,

    /// Only dates strictly after this one are attempted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_date: Option<NaiveDate>,

    /// Scanning stops at the first date after this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_date: Option<NaiveDate>,

    /// Application schedule id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,

    /// Primary facility id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,

    /// Label fragment selecting the primary facility among several
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_key: Option<String>,

    /// Whether every booking needs a coupled secondary slot
    #[serde(default)]
    pub need_secondary: bool,

    /// Secondary facility id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_facility_id: Option<String>,

    /// Label fragment selecting the secondary facility among several
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_facility_key: Option<String>,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("email", &self.email)
            .field("password", &mask(&self.password))
            .field("country", &self.country)
            .field("min_date", &self.min_date)
            .field("max_date", &self.max_date)
            .field("schedule_id", &self.schedule_id)
            .field("facility_id", &self.facility_id)
            .field("need_secondary", &self.need_secondary)
            .field("secondary_facility_id", &self.secondary_facility_id)
            .finish()
    }
}

impl AccountConfig {
    /// Create an in-memory account with the required identity fields
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            country: country.into(),
            min_date: None,
            max_date: None,
            schedule_id: None,
            facility_id: None,
            facility_key: None,
            need_secondary: false,
            secondary_facility_id: None,
            secondary_facility_key: None,
            path: None,
        }
    }

    /// Load an account file, applying the min-date default
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.path = Some(path.to_path_buf());
        config.country = config.country.trim().to_lowercase();
        if config.min_date.is_none() {
            config.min_date = Some(Local::now().date_naive());
        }
        config.validate()?;
        Ok(config)
    }

    /// Bind this account to a file; subsequent [`save`](Self::save) calls
    /// write there
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist to the backing file
    ///
    /// In-memory accounts (no backing file) are a no-op.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Atomic write using temp file
        let temp_path = path.with_extension("tmp");
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(Error::config("email is required"));
        }

        if self.password.is_empty() {
            return Err(Error::config("password is required"));
        }

        if country_name(&self.country).is_none() {
            return Err(Error::config(format!(
                "unknown country code: {}",
                self.country
            )));
        }

        if let (Some(min), Some(max)) = (self.min_date, self.max_date) {
            if min > max {
                return Err(Error::config(format!(
                    "min_date {min} is after max_date {max}"
                )));
            }
        }

        Ok(())
    }

    /// Stable identifier used for task bookkeeping and log fields
    pub fn account_id(&self) -> String {
        self.email.trim().to_lowercase()
    }

    /// Acceptable booking window, defaulting the floor to today
    pub fn bounds(&self) -> DateBounds {
        DateBounds::new(
            self.min_date.unwrap_or_else(|| Local::now().date_naive()),
            self.max_date,
        )
    }

    /// Known id for a resource kind
    pub fn resource_id(&self, kind: ResourceKind) -> Option<&str> {
        match kind {
            ResourceKind::Schedule => self.schedule_id.as_deref(),
            ResourceKind::Primary => self.facility_id.as_deref(),
            ResourceKind::Secondary => self.secondary_facility_id.as_deref(),
        }
    }

    /// Disambiguating label fragment for a resource kind
    pub fn resource_key(&self, kind: ResourceKind) -> Option<&str> {
        match kind {
            ResourceKind::Schedule => None,
            ResourceKind::Primary => self.facility_key.as_deref(),
            ResourceKind::Secondary => self.secondary_facility_key.as_deref(),
        }
    }

    /// Record a resolved id and persist immediately
    pub fn set_resource_id(&mut self, kind: ResourceKind, id: impl Into<String>) -> Result<()> {
        let id = Some(id.into());
        match kind {
            ResourceKind::Schedule => self.schedule_id = id,
            ResourceKind::Primary => self.facility_id = id,
            ResourceKind::Secondary => self.secondary_facility_id = id,
        }
        self.save()
    }

    /// Location of the secondary availability snapshot next to the account
    /// file
    pub fn secondary_cache_path(&self) -> Option<PathBuf> {
        let path = self.path.as_ref()?;
        let stem = path.file_stem()?.to_string_lossy();
        Some(path.with_file_name(format!("{stem}.secondary.json")))
    }

    /// Template written by `slotwatch init`
    pub fn template() -> &'static str {
        r#"# slotwatch account
email = "you@example.com"
password = "change-me"
country = "ca"

# Only dates strictly after min_date are attempted (defaults to today)
# min_date = "2025-01-01"
# max_date = "2025-06-30"

# Filled in automatically when the portal offers exactly one choice,
# or when the label contains the matching key.
# schedule_id = ""
# facility_id = ""
# facility_key = "Toronto"

need_secondary = false
# secondary_facility_id = ""
# secondary_facility_key = "Toronto"
"#
    }
}
