//! Local user-account store gating access to the tool. File-backed JSON
//! under the OS config directory; credentials are stored as sha-256 digests.
//! Uniqueness violations and bad credentials surface as failure messages,
//! never as errors; only I/O problems propagate.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::APP_DIR_NAME;

pub const USERS_FILE_NAME: &str = "users.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

pub struct UserStore {
    path: PathBuf,
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w.\-]+@[\w.\-]+\.\w+$").expect("email pattern"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_re().is_match(email)
}

/// At least 8 characters with one uppercase, one lowercase and one digit.
pub fn check_password_strength(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must include at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must include at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must include at least one number");
    }
    Ok(())
}

fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    format!("{:x}", digest)
}

impl UserStore {
    /// `FIXIFOX_DATA_DIR` overrides the OS config directory so tests and
    /// scripts can point the store somewhere disposable.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("FIXIFOX_DATA_DIR") {
            return Ok(PathBuf::from(dir).join(USERS_FILE_NAME));
        }
        let base = dirs::config_dir().context("unable to resolve OS config directory")?;
        Ok(base.join(APP_DIR_NAME).join(USERS_FILE_NAME))
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self { path: Self::default_path()? })
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<Vec<UserRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading user store: {}", self.path.display()))?;
        let users = serde_json::from_str(&text).context("parsing user store JSON")?;
        Ok(users)
    }

    fn save(&self, users: &[UserRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating user store dir: {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(users).context("serializing user store")?;
        fs::write(&self.path, text)
            .with_context(|| format!("writing user store: {}", self.path.display()))?;
        Ok(())
    }

    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<(bool, String)> {
        if username.trim().is_empty() {
            return Ok((false, "Username must not be empty!".to_string()));
        }
        if !is_valid_email(email) {
            return Ok((false, "Please enter a valid email address!".to_string()));
        }
        if let Err(reason) = check_password_strength(password) {
            return Ok((false, reason.to_string()));
        }
        let mut users = self.load()?;
        let taken = users
            .iter()
            .any(|u| u.username == username || u.email.eq_ignore_ascii_case(email));
        if taken {
            return Ok((false, "Username or email already exists!".to_string()));
        }
        users.push(UserRecord {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password),
            created_at: Utc::now(),
            last_login: None,
        });
        self.save(&users)?;
        Ok((true, "Registration successful! Please log in.".to_string()))
    }

    pub fn login(&self, username: &str, password: &str) -> Result<(bool, String)> {
        let mut users = self.load()?;
        let hash = hash_password(password);
        let found = users
            .iter_mut()
            .find(|u| u.username == username && u.password_hash == hash);
        match found {
            Some(user) => {
                user.last_login = Some(Utc::now());
                self.save(&users)?;
                Ok((true, "Login successful!".to_string()))
            }
            None => Ok((false, "Invalid username or password!".to_string())),
        }
    }
}
