//! Staff accounts: administration, own profile and first-run bootstrap.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, AuthError, PasswordPolicy};
use crate::config::Config;
use crate::db::{self, DatabaseError};
use crate::models::{now, Cargo, User};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Usuário deve ter entre 3 e 64 caracteres")]
    InvalidUsername,

    #[error("Usuário já existe")]
    UsernameTaken,

    #[error("CRO já cadastrado")]
    CroTaken,

    #[error("Senha obrigatória")]
    MissingPassword,

    #[error("Admin já existe")]
    AlreadyBootstrapped,

    #[error("Usuário não encontrado")]
    NotFound,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Admin form for create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct UserForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub nome_completo: Option<String>,
    #[serde(default)]
    pub cro: Option<String>,
    #[serde(default)]
    pub nome_profissional: Option<String>,
    #[serde(default = "default_cargo")]
    pub cargo: Cargo,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_cargo() -> Cargo {
    Cargo::Atendimento
}

/// Fields a user may change on their own account.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub nome_completo: Option<String>,
    pub nome_profissional: Option<String>,
    pub cro: Option<String>,
    pub password: Option<String>,
}

/// Login picker entry.
#[derive(Debug, Clone, Serialize)]
pub struct LoginChoice {
    pub id: i64,
    pub username: String,
    pub nome: String,
    pub cargo: Cargo,
}

impl From<&User> for LoginChoice {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            nome: u.display_name().to_string(),
            cargo: u.cargo,
        }
    }
}

fn check_username(username: &str) -> Result<(), UserError> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(UserError::InvalidUsername);
    }
    Ok(())
}

fn check_conflicts(
    conn: &Connection,
    username: &str,
    cro: Option<&str>,
    exclude: Option<i64>,
) -> Result<(), UserError> {
    if db::find_username_owner(conn, username, exclude)?.is_some() {
        return Err(UserError::UsernameTaken);
    }
    if let Some(cro) = cro {
        if db::find_cro_owner(conn, cro, exclude)?.is_some() {
            return Err(UserError::CroTaken);
        }
    }
    Ok(())
}

fn new_password_hash(
    config: &Config,
    username: &str,
    password: &str,
) -> Result<String, UserError> {
    PasswordPolicy::from_config(config).check(username, password)?;
    Ok(hash_password(password, config.pbkdf2_iterations))
}

/// Create an account; the password is mandatory and policy-checked.
pub fn create_user(conn: &Connection, config: &Config, form: &UserForm) -> Result<User, UserError> {
    let username = form.username.trim();
    check_username(username)?;
    let cro = clean(&form.cro);
    check_conflicts(conn, username, cro.as_deref(), None)?;
    let password = clean(&form.password).ok_or(UserError::MissingPassword)?;
    let nome_completo = clean(&form.nome_completo);
    let ts = now();

    let mut user = User {
        id: 0,
        username: username.to_string(),
        nome_profissional: clean(&form.nome_profissional).or_else(|| nome_completo.clone()),
        nome_completo,
        cro,
        password_hash: new_password_hash(config, username, &password)?,
        cargo: form.cargo,
        is_active: true,
        criado_em: ts,
        failed_login_count: 0,
        locked_until: None,
        last_password_change: Some(ts),
    };
    user.id = db::insert_user(conn, &user)?;
    tracing::info!(username = %user.username, cargo = %user.cargo, "User created");
    Ok(user)
}

/// Update an account; a blank password keeps the current one.
pub fn update_user(
    conn: &Connection,
    config: &Config,
    id: i64,
    form: &UserForm,
) -> Result<User, UserError> {
    let mut user = db::get_user(conn, id)?.ok_or(UserError::NotFound)?;
    let username = form.username.trim();
    check_username(username)?;
    let cro = clean(&form.cro);
    check_conflicts(conn, username, cro.as_deref(), Some(id))?;

    let nome_completo = clean(&form.nome_completo);
    user.username = username.to_string();
    user.nome_profissional = clean(&form.nome_profissional).or_else(|| nome_completo.clone());
    user.nome_completo = nome_completo;
    user.cro = cro;
    user.cargo = form.cargo;
    db::update_user_profile(conn, &user)?;

    if let Some(password) = clean(&form.password) {
        let hash = new_password_hash(config, &user.username, &password)?;
        let ts = now();
        db::set_user_password(conn, id, &hash, ts)?;
        user.password_hash = hash;
        user.last_password_change = Some(ts);
    }
    Ok(user)
}

/// Self-service profile update.
pub fn update_profile(
    conn: &Connection,
    config: &Config,
    id: i64,
    form: &ProfileForm,
) -> Result<User, UserError> {
    let mut user = db::get_user(conn, id)?.ok_or(UserError::NotFound)?;
    let cro = clean(&form.cro);
    if let Some(cro) = cro.as_deref() {
        if db::find_cro_owner(conn, cro, Some(id))?.is_some() {
            return Err(UserError::CroTaken);
        }
    }
    if form.nome_completo.is_some() {
        user.nome_completo = clean(&form.nome_completo);
    }
    if form.nome_profissional.is_some() {
        user.nome_profissional = clean(&form.nome_profissional);
    }
    if form.cro.is_some() {
        user.cro = cro;
    }
    db::update_user_profile(conn, &user)?;

    if let Some(password) = clean(&form.password) {
        let hash = new_password_hash(config, &user.username, &password)?;
        let ts = now();
        db::set_user_password(conn, id, &hash, ts)?;
        user.password_hash = hash;
        user.last_password_change = Some(ts);
    }
    Ok(user)
}

/// Flip `is_active`; returns the new state.
pub fn toggle_active(conn: &Connection, id: i64) -> Result<bool, UserError> {
    let user = db::get_user(conn, id)?.ok_or(UserError::NotFound)?;
    let active = !user.is_active;
    db::set_user_active(conn, id, active)?;
    Ok(active)
}

/// Create the first administrator. Refused once any account exists.
pub fn bootstrap_admin(
    conn: &Connection,
    config: &Config,
    form: &UserForm,
) -> Result<User, UserError> {
    if db::count_users(conn)? > 0 {
        return Err(UserError::AlreadyBootstrapped);
    }
    let form = UserForm {
        cargo: Cargo::Admin,
        ..form.clone()
    };
    create_user(conn, config, &form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::db::{open_memory_database, Bind};

    fn config() -> Config {
        Config {
            pbkdf2_iterations: 1_000,
            ..Config::default()
        }
    }

    fn form(username: &str, cro: Option<&str>, password: Option<&str>) -> UserForm {
        UserForm {
            username: username.into(),
            nome_completo: Some("Ana Souza".into()),
            cro: cro.map(String::from),
            nome_profissional: None,
            cargo: Cargo::Dentista,
            password: password.map(String::from),
        }
    }

    #[test]
    fn create_defaults_professional_name() {
        let conn = open_memory_database(Bind::Users).unwrap();
        let user = create_user(&conn, &config(), &form("ana", Some("SP-1"), Some("sorriso2024"))).unwrap();
        assert_eq!(user.nome_profissional.as_deref(), Some("Ana Souza"));
        let stored = db::get_user(&conn, user.id).unwrap().unwrap();
        assert!(verify_password("sorriso2024", &stored.password_hash));
    }

    #[test]
    fn create_conflicts_and_password_rules() {
        let conn = open_memory_database(Bind::Users).unwrap();
        let cfg = config();
        create_user(&conn, &cfg, &form("ana", Some("SP-1"), Some("sorriso2024"))).unwrap();

        let err = create_user(&conn, &cfg, &form("ana", None, Some("sorriso2024"))).unwrap_err();
        assert_eq!(err.to_string(), "Usuário já existe");
        let err = create_user(&conn, &cfg, &form("bia", Some("SP-1"), Some("sorriso2024"))).unwrap_err();
        assert_eq!(err.to_string(), "CRO já cadastrado");
        let err = create_user(&conn, &cfg, &form("bia", None, None)).unwrap_err();
        assert_eq!(err.to_string(), "Senha obrigatória");
        let err = create_user(&conn, &cfg, &form("bia", None, Some("curta1"))).unwrap_err();
        assert_eq!(err.to_string(), "Senha curta demais");
        let err = create_user(&conn, &cfg, &form("x", None, Some("sorriso2024"))).unwrap_err();
        assert!(matches!(err, UserError::InvalidUsername));
    }

    #[test]
    fn update_excludes_self_from_conflicts() {
        let conn = open_memory_database(Bind::Users).unwrap();
        let cfg = config();
        let ana = create_user(&conn, &cfg, &form("ana", Some("SP-1"), Some("sorriso2024"))).unwrap();
        let old_hash = ana.password_hash.clone();

        let updated = update_user(&conn, &cfg, ana.id, &form("ana", Some("SP-1"), None)).unwrap();
        assert_eq!(updated.password_hash, old_hash);

        let bia = create_user(&conn, &cfg, &form("bia", None, Some("sorriso2024"))).unwrap();
        let err = update_user(&conn, &cfg, bia.id, &form("ana", None, None)).unwrap_err();
        assert!(matches!(err, UserError::UsernameTaken));
        assert!(matches!(
            update_user(&conn, &cfg, 999, &form("zed", None, None)),
            Err(UserError::NotFound)
        ));
    }

    #[test]
    fn toggle_and_bootstrap() {
        let conn = open_memory_database(Bind::Users).unwrap();
        let cfg = config();
        let admin = bootstrap_admin(&conn, &cfg, &form("chefe", None, Some("sorriso2024"))).unwrap();
        assert_eq!(admin.cargo, Cargo::Admin);
        assert!(matches!(
            bootstrap_admin(&conn, &cfg, &form("outro", None, Some("sorriso2024"))),
            Err(UserError::AlreadyBootstrapped)
        ));
        assert!(!toggle_active(&conn, admin.id).unwrap());
        assert!(toggle_active(&conn, admin.id).unwrap());
    }

    #[test]
    fn profile_update_only_touches_given_fields() {
        let conn = open_memory_database(Bind::Users).unwrap();
        let cfg = config();
        let ana = create_user(&conn, &cfg, &form("ana", Some("SP-1"), Some("sorriso2024"))).unwrap();
        let updated = update_profile(
            &conn,
            &cfg,
            ana.id,
            &ProfileForm {
                nome_profissional: Some("Dra. Ana".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.display_name(), "Dra. Ana");
        assert_eq!(updated.cro.as_deref(), Some("SP-1"));
    }
}
