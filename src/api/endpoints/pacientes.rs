//! Patient records: registration, clinical record, treatment plans,
//! history and the per-patient ledger.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Datelike;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, PageQuery, UserContext};
use crate::db::{self, Bind, Page, Paginated};
use crate::models::{
    now, today, Anamnese, Cargo, Ficha, Historico, Lancamento, Money, Paciente,
    PlanoTratamento, Procedimento,
};
use crate::patients::{
    self, financial_totals, format_br_date, period_bounds, Dashboard, FinancialTotals,
    HistoricoForm, LancamentoForm, PacienteForm, PlanoForm, ProcedimentoForm,
};

const PACIENTES_PER_PAGE: u32 = 10;
const HISTORICO_PER_PAGE: u32 = 20;
const FINANCEIRO_PER_PAGE: u32 = 20;
const BUSCA_LIMIT: i64 = 10;
const BUSCA_MIN_CHARS: usize = 2;

/// Staff allowed to register and edit patients.
const CADASTRO: &[Cargo] = &[Cargo::Admin, Cargo::Gerente, Cargo::Atendimento];
const GESTAO: &[Cargo] = &[Cargo::Admin, Cargo::Gerente];

// ═══════════════════════════════════════════════════════════
// Lookups
// ═══════════════════════════════════════════════════════════

/// A patient that exists and is not soft-deleted.
fn active_paciente(conn: &Connection, id: i64) -> Result<Paciente, ApiError> {
    let paciente = db::get_paciente(conn, id)?.ok_or_else(|| ApiError::not_found("Paciente"))?;
    if paciente.is_deleted() {
        return Err(ApiError::Gone("Paciente removido".into()));
    }
    Ok(paciente)
}

/// A plan of `paciente_id`; a plan of someone else is a bad request.
fn plano_do_paciente(
    conn: &Connection,
    paciente_id: i64,
    plano_id: i64,
) -> Result<PlanoTratamento, ApiError> {
    let plano = db::get_plano(conn, plano_id)?.ok_or_else(|| ApiError::not_found("Plano"))?;
    if plano.paciente_id != paciente_id {
        return Err(ApiError::BadRequest("Plano não pertence ao paciente".into()));
    }
    Ok(plano)
}

fn procedimento_do_plano(
    conn: &Connection,
    plano_id: i64,
    procedimento_id: i64,
) -> Result<Procedimento, ApiError> {
    let proc = db::get_procedimento(conn, procedimento_id)?
        .ok_or_else(|| ApiError::not_found("Procedimento"))?;
    if proc.plano_id != plano_id {
        return Err(ApiError::BadRequest(
            "Procedimento não pertence ao plano".into(),
        ));
    }
    Ok(proc)
}

fn check_cpf_free(conn: &Connection, cpf: Option<&str>, exclude: Option<i64>) -> Result<(), ApiError> {
    if let Some(cpf) = cpf {
        if db::find_cpf_owner(conn, cpf, exclude)?.is_some() {
            return Err(ApiError::Conflict("CPF já cadastrado".into()));
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Registration
// ═══════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub struct ListQuery {
    pub busca: Option<String>,
    pub page: Option<u32>,
}

/// `GET /api/pacientes?busca=&page=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<Paciente>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    let page = Page::new(query.page, PACIENTES_PER_PAGE);
    Ok(Json(db::list_pacientes(&conn, query.busca.as_deref(), page)?))
}

/// `POST /api/pacientes`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Json(form): Json<PacienteForm>,
) -> Result<(StatusCode, Json<Paciente>), ApiError> {
    me.require(CADASTRO)?;
    let dados = form.validate()?;
    let paciente = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            check_cpf_free(tx, dados.cpf.as_deref(), None)?;
            let id = db::insert_paciente(tx, &dados)?;
            db::get_paciente(tx, id)?.ok_or_else(|| ApiError::not_found("Paciente"))
        })
        .await?;
    tracing::info!(paciente_id = paciente.id, by = %me.user.username, "Patient registered");
    Ok((StatusCode::CREATED, Json(paciente)))
}

#[derive(Serialize)]
pub struct PacienteView {
    #[serde(flatten)]
    pub paciente: Paciente,
    pub idade: Option<i32>,
    /// Present when the patient has ledger entries.
    pub saldo: Option<Money>,
}

/// `GET /api/pacientes/:id`
pub async fn view(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<PacienteView>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    let paciente = active_paciente(&conn, id)?;
    let entries = db::lancamentos_do_paciente(&conn, id)?;
    let saldo = (!entries.is_empty()).then(|| financial_totals(&entries).saldo);
    Ok(Json(PacienteView {
        idade: paciente.idade(),
        paciente,
        saldo,
    }))
}

/// `PUT /api/pacientes/:id`: a blank CPF clears the stored one.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(form): Json<PacienteForm>,
) -> Result<Json<Paciente>, ApiError> {
    me.require(CADASTRO)?;
    let dados = form.validate()?;
    let paciente = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            check_cpf_free(tx, dados.cpf.as_deref(), Some(id))?;
            db::update_paciente(tx, id, &dados)?;
            db::get_paciente(tx, id)?.ok_or_else(|| ApiError::not_found("Paciente"))
        })
        .await?;
    Ok(Json(paciente))
}

/// `DELETE /api/pacientes/:id`: soft delete.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    me.require_admin()?;
    ctx.core
        .write_blocking(Bind::Pacientes, move |tx| {
            let paciente = db::get_paciente(tx, id)?.ok_or_else(|| ApiError::not_found("Paciente"))?;
            if paciente.is_deleted() {
                return Err(ApiError::BadRequest("Já removido".into()));
            }
            Ok(db::set_paciente_deleted(tx, id, Some(now()))?)
        })
        .await?;
    tracing::info!(paciente_id = id, by = %me.user.username, "Patient removed");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/pacientes/:id/restore`
pub async fn restore(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<Json<Paciente>, ApiError> {
    me.require_admin()?;
    let paciente = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            let paciente = db::get_paciente(tx, id)?.ok_or_else(|| ApiError::not_found("Paciente"))?;
            if !paciente.is_deleted() {
                return Err(ApiError::BadRequest("Paciente não está removido".into()));
            }
            db::set_paciente_deleted(tx, id, None)?;
            Ok(Paciente {
                deleted_at: None,
                ..paciente
            })
        })
        .await?;
    tracing::info!(paciente_id = id, by = %me.user.username, "Patient restored");
    Ok(Json(paciente))
}

// ═══════════════════════════════════════════════════════════
// Ficha / Anamnese
// ═══════════════════════════════════════════════════════════

/// `GET /api/pacientes/:id/ficha`
pub async fn ficha(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<Ficha>, ApiError> {
    let ficha = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            Ok::<_, ApiError>(db::get_or_create_ficha(tx, id)?)
        })
        .await?;
    Ok(Json(ficha))
}

/// `PUT /api/pacientes/:id/ficha`
pub async fn update_ficha(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(form): Json<Ficha>,
) -> Result<Json<Ficha>, ApiError> {
    me.require(CADASTRO)?;
    let ficha = Ficha {
        paciente_id: id,
        ..form
    };
    let row = ficha.clone();
    ctx.core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            Ok::<_, ApiError>(db::save_ficha(tx, &row)?)
        })
        .await?;
    Ok(Json(ficha))
}

/// `GET /api/pacientes/:id/anamnese`
pub async fn anamnese(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<Anamnese>, ApiError> {
    let anamnese = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            Ok::<_, ApiError>(db::get_or_create_anamnese(tx, id)?)
        })
        .await?;
    Ok(Json(anamnese))
}

/// `PUT /api/pacientes/:id/anamnese`: stamps `ultima_atualizacao`.
pub async fn update_anamnese(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(form): Json<Anamnese>,
) -> Result<Json<Anamnese>, ApiError> {
    me.require(Cargo::CLINICO)?;
    let anamnese = Anamnese {
        paciente_id: id,
        ultima_atualizacao: Some(now()),
        ..form
    };
    let row = anamnese.clone();
    ctx.core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            Ok::<_, ApiError>(db::save_anamnese(tx, &row)?)
        })
        .await?;
    Ok(Json(anamnese))
}

// ═══════════════════════════════════════════════════════════
// Treatment plans
// ═══════════════════════════════════════════════════════════

/// `GET /api/pacientes/:id/planos`: newest first.
pub async fn planos(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PlanoTratamento>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    active_paciente(&conn, id)?;
    Ok(Json(db::list_planos(&conn, id)?))
}

/// `POST /api/pacientes/:id/planos`
pub async fn create_plano(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(form): Json<PlanoForm>,
) -> Result<(StatusCode, Json<PlanoTratamento>), ApiError> {
    me.require(GESTAO)?;
    let (descricao, status, observacoes) = form.validate()?;
    let plano = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            let plano_id = db::insert_plano(tx, id, &descricao, status, observacoes.as_deref())?;
            db::get_plano(tx, plano_id)?.ok_or_else(|| ApiError::not_found("Plano"))
        })
        .await?;
    Ok((StatusCode::CREATED, Json(plano)))
}

#[derive(Serialize)]
pub struct PlanoView {
    pub plano: PlanoTratamento,
    pub procedimentos: Vec<Procedimento>,
    pub financeiro: FinancialTotals,
}

/// `GET /api/pacientes/:id/planos/:plano_id`
pub async fn plano(
    State(ctx): State<ApiContext>,
    Path((id, plano_id)): Path<(i64, i64)>,
) -> Result<Json<PlanoView>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    active_paciente(&conn, id)?;
    let plano = plano_do_paciente(&conn, id, plano_id)?;
    let procedimentos = db::list_procedimentos(&conn, plano_id)?;
    let entries = db::lancamentos_do_plano(&conn, plano_id)?;
    Ok(Json(PlanoView {
        plano,
        procedimentos,
        financeiro: financial_totals(&entries),
    }))
}

#[derive(Serialize)]
pub struct OrcamentoResponse {
    pub plano_id: i64,
    pub orcamento_total: Money,
}

/// `POST /api/pacientes/:id/planos/:plano_id/recalcular`
pub async fn recalcular(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path((id, plano_id)): Path<(i64, i64)>,
) -> Result<Json<OrcamentoResponse>, ApiError> {
    me.require(GESTAO)?;
    let orcamento_total = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            plano_do_paciente(tx, id, plano_id)?;
            Ok::<_, ApiError>(db::recompute_orcamento(tx, plano_id)?)
        })
        .await?;
    Ok(Json(OrcamentoResponse {
        plano_id,
        orcamento_total,
    }))
}

/// `POST /api/pacientes/:id/planos/:plano_id/procedimentos`
pub async fn add_procedimento(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path((id, plano_id)): Path<(i64, i64)>,
    Json(form): Json<ProcedimentoForm>,
) -> Result<(StatusCode, Json<Procedimento>), ApiError> {
    me.require(Cargo::CLINICO)?;
    let proc = form.into_procedimento(plano_id)?;
    let proc = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            plano_do_paciente(tx, id, plano_id)?;
            let proc_id = db::insert_procedimento(tx, &proc)?;
            db::get_procedimento(tx, proc_id)?.ok_or_else(|| ApiError::not_found("Procedimento"))
        })
        .await?;
    Ok((StatusCode::CREATED, Json(proc)))
}

/// `DELETE /api/pacientes/:id/planos/:plano_id/procedimentos/:proc_id`
pub async fn delete_procedimento(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path((id, plano_id, proc_id)): Path<(i64, i64, i64)>,
) -> Result<StatusCode, ApiError> {
    me.require(GESTAO)?;
    ctx.core
        .write_blocking(Bind::Pacientes, move |tx| {
            plano_do_paciente(tx, id, plano_id)?;
            procedimento_do_plano(tx, plano_id, proc_id)?;
            Ok::<_, ApiError>(db::delete_procedimento(tx, proc_id)?)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Default)]
pub struct RealizadoBody {
    pub data_realizado: Option<chrono::NaiveDate>,
}

/// `POST /api/pacientes/:id/planos/:plano_id/procedimentos/:proc_id/realizado`
pub async fn procedimento_realizado(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path((id, plano_id, proc_id)): Path<(i64, i64, i64)>,
    body: Option<Json<RealizadoBody>>,
) -> Result<Json<Procedimento>, ApiError> {
    me.require(Cargo::CLINICO)?;
    let date = body
        .and_then(|Json(b)| b.data_realizado)
        .unwrap_or_else(today);
    let proc = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            plano_do_paciente(tx, id, plano_id)?;
            procedimento_do_plano(tx, plano_id, proc_id)?;
            db::mark_procedimento_realizado(tx, proc_id, date)?;
            db::get_procedimento(tx, proc_id)?.ok_or_else(|| ApiError::not_found("Procedimento"))
        })
        .await?;
    Ok(Json(proc))
}

// ═══════════════════════════════════════════════════════════
// History
// ═══════════════════════════════════════════════════════════

/// `GET /api/pacientes/:id/historico?page=`
pub async fn historico(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paginated<Historico>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    active_paciente(&conn, id)?;
    let page = Page::new(query.page, HISTORICO_PER_PAGE);
    Ok(Json(db::list_historicos(&conn, id, page)?))
}

/// `POST /api/pacientes/:id/historico`
pub async fn add_historico(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(form): Json<HistoricoForm>,
) -> Result<(StatusCode, Json<Historico>), ApiError> {
    me.require(Cargo::CLINICO)?;
    let mut entry = form.into_historico(id)?;
    let row = entry.clone();
    let historico_id = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            Ok::<_, ApiError>(db::insert_historico(tx, &row)?)
        })
        .await?;
    entry.id = historico_id;
    Ok((StatusCode::CREATED, Json(entry)))
}

// ═══════════════════════════════════════════════════════════
// Ledger
// ═══════════════════════════════════════════════════════════

#[derive(Serialize)]
pub struct FinanceiroView {
    #[serde(flatten)]
    pub page: Paginated<Lancamento>,
    pub totais: FinancialTotals,
}

/// `GET /api/pacientes/:id/financeiro?page=`
pub async fn financeiro(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<FinanceiroView>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    active_paciente(&conn, id)?;
    let page = db::list_lancamentos(&conn, id, Page::new(query.page, FINANCEIRO_PER_PAGE))?;
    let all = db::lancamentos_do_paciente(&conn, id)?;
    Ok(Json(FinanceiroView {
        page,
        totais: financial_totals(&all),
    }))
}

/// `GET /api/pacientes/:id/financeiro/totais`
pub async fn financeiro_totais(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<FinancialTotals>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    active_paciente(&conn, id)?;
    let all = db::lancamentos_do_paciente(&conn, id)?;
    Ok(Json(financial_totals(&all)))
}

/// `POST /api/pacientes/:id/financeiro`: an entry tied to a procedure
/// inherits the procedure's plan.
pub async fn add_lancamento(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(form): Json<LancamentoForm>,
) -> Result<(StatusCode, Json<Lancamento>), ApiError> {
    me.require(Cargo::FINANCEIRO_ALL)?;
    let entry = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            active_paciente(tx, id)?;
            let plano_id = match form.procedimento_id {
                Some(proc_id) => {
                    let proc = db::get_procedimento(tx, proc_id)?
                        .ok_or_else(|| ApiError::not_found("Procedimento"))?;
                    plano_do_paciente(tx, id, proc.plano_id)?;
                    Some(proc.plano_id)
                }
                None => None,
            };
            let mut entry = form.clone().into_lancamento(id, plano_id)?;
            entry.id = db::insert_lancamento(tx, &entry)?;
            Ok::<_, ApiError>(entry)
        })
        .await?;
    tracing::info!(paciente_id = id, lancamento_id = entry.id, by = %me.user.username, "Ledger entry added");
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `DELETE /api/pacientes/:id/financeiro/:lancamento_id`
pub async fn delete_lancamento(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path((id, lancamento_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    me.require(Cargo::FINANCEIRO_ALL)?;
    ctx.core
        .write_blocking(Bind::Pacientes, move |tx| {
            let entry = db::get_lancamento(tx, lancamento_id)?
                .filter(|e| e.paciente_id == id)
                .ok_or_else(|| ApiError::not_found("Lançamento"))?;
            Ok::<_, ApiError>(db::delete_lancamento(tx, entry.id)?)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ═══════════════════════════════════════════════════════════
// Lookups and dashboard
// ═══════════════════════════════════════════════════════════

/// `GET /api/pacientes/aniversariantes`: birthdays of the current month.
pub async fn aniversariantes(
    State(ctx): State<ApiContext>,
) -> Result<Json<Vec<Paciente>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    Ok(Json(db::list_aniversariantes(&conn, today().month())?))
}

#[derive(Serialize)]
pub struct DadosBasicos {
    pub id: i64,
    pub nome: String,
    pub data_nascimento: Option<String>,
    pub idade: Option<i32>,
    pub telefone: Option<String>,
    pub email: Option<String>,
}

/// `GET /api/pacientes/api/:id/dados`
pub async fn dados(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<DadosBasicos>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    let p = active_paciente(&conn, id)?;
    Ok(Json(DadosBasicos {
        id: p.id,
        idade: p.idade(),
        data_nascimento: p.dados.data_nascimento.map(format_br_date),
        telefone: p.dados.celular.clone().or_else(|| p.dados.telefone.clone()),
        email: p.dados.email.clone(),
        nome: p.dados.nome,
    }))
}

#[derive(Deserialize)]
pub struct BuscaQuery {
    #[serde(default)]
    pub term: String,
}

#[derive(Serialize)]
pub struct BuscaItem {
    pub id: i64,
    pub nome: String,
}

/// `GET /api/pacientes/api/buscar?term=`
pub async fn buscar(
    State(ctx): State<ApiContext>,
    Query(query): Query<BuscaQuery>,
) -> Result<Json<Vec<BuscaItem>>, ApiError> {
    let term = query.term.trim();
    if term.chars().count() < BUSCA_MIN_CHARS {
        return Ok(Json(Vec::new()));
    }
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    let rows = db::search_paciente_nomes(&conn, term, BUSCA_LIMIT)?;
    Ok(Json(
        rows.into_iter()
            .map(|(id, nome)| BuscaItem { id, nome })
            .collect(),
    ))
}

#[derive(Deserialize, Default)]
pub struct DashboardQuery {
    pub inicio: Option<String>,
    pub fim: Option<String>,
}

/// `GET /api/pacientes/dashboard?inicio=dd/mm/aaaa&fim=dd/mm/aaaa`
pub async fn dashboard(
    State(ctx): State<ApiContext>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, ApiError> {
    let period = match (query.inicio.as_deref(), query.fim.as_deref()) {
        (Some(inicio), Some(fim)) => period_bounds(inicio, fim),
        _ => None,
    };
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    Ok(Json(patients::dashboard(&conn, period)?))
}
