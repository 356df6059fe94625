//! Clinic identity printed on documents.

use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db::{self, Bind};
use crate::models::Clinica;

/// `GET /api/clinica`
pub async fn get(State(ctx): State<ApiContext>) -> Result<Json<Clinica>, ApiError> {
    Ok(Json(ctx.core.clinica().await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClinicaForm {
    pub nome: String,
    pub endereco: Option<String>,
    pub telefone: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
    pub cnpj: Option<String>,
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ClinicaForm {
    fn apply_to(&self, clinica: &mut Clinica) -> Result<(), ApiError> {
        let nome = self.nome.trim();
        if nome.is_empty() {
            return Err(ApiError::BadRequest("Nome obrigatório".into()));
        }
        clinica.nome = nome.to_string();
        clinica.endereco = clean(&self.endereco);
        clinica.telefone = clean(&self.telefone);
        clinica.cidade = clean(&self.cidade);
        clinica.estado = clean(&self.estado).map(|uf| uf.to_uppercase());
        clinica.cnpj = clean(&self.cnpj);
        Ok(())
    }
}

/// `PUT /api/clinica` (admin)
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Json(form): Json<ClinicaForm>,
) -> Result<Json<Clinica>, ApiError> {
    me.require_admin()?;
    let clinica = ctx
        .core
        .write_blocking(Bind::Users, move |tx| {
            let mut clinica = db::get_or_create_clinica(tx)?;
            form.apply_to(&mut clinica)?;
            db::update_clinica(tx, &clinica)?;
            Ok::<_, ApiError>(db::get_or_create_clinica(tx)?)
        })
        .await?;
    tracing::info!(by = %me.user.username, "Clinic details updated");
    Ok(Json(clinica))
}
