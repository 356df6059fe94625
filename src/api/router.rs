//! HTTP router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Auth validator → 2. Audit logger

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn protected_routes() -> Router<ApiContext> {
    use endpoints::{
        agenda, ai, anestesico, atestados, auth, catalogo, clinica, cro, documentos, pacientes,
        receitas, reports, users,
    };

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    Router::new()
        .route("/auth/logout", post(auth::logout))
        // Users
        .route("/users", get(users::list).post(users::create))
        .route("/users/me", get(users::me).put(users::update_me))
        .route("/users/:id", put(users::update).delete(users::delete))
        .route("/users/:id/toggle", post(users::toggle))
        // Patients
        .route("/pacientes", get(pacientes::list).post(pacientes::create))
        .route("/pacientes/aniversariantes", get(pacientes::aniversariantes))
        .route("/pacientes/dashboard", get(pacientes::dashboard))
        .route("/pacientes/api/buscar", get(pacientes::buscar))
        .route("/pacientes/api/:id/dados", get(pacientes::dados))
        .route(
            "/pacientes/:id",
            get(pacientes::view)
                .put(pacientes::update)
                .delete(pacientes::delete),
        )
        .route("/pacientes/:id/restore", post(pacientes::restore))
        .route(
            "/pacientes/:id/ficha",
            get(pacientes::ficha).put(pacientes::update_ficha),
        )
        .route(
            "/pacientes/:id/anamnese",
            get(pacientes::anamnese).put(pacientes::update_anamnese),
        )
        .route(
            "/pacientes/:id/planos",
            get(pacientes::planos).post(pacientes::create_plano),
        )
        .route("/pacientes/:id/planos/:plano_id", get(pacientes::plano))
        .route(
            "/pacientes/:id/planos/:plano_id/recalcular",
            post(pacientes::recalcular),
        )
        .route(
            "/pacientes/:id/planos/:plano_id/procedimentos",
            post(pacientes::add_procedimento),
        )
        .route(
            "/pacientes/:id/planos/:plano_id/procedimentos/:proc_id",
            axum::routing::delete(pacientes::delete_procedimento),
        )
        .route(
            "/pacientes/:id/planos/:plano_id/procedimentos/:proc_id/realizado",
            post(pacientes::procedimento_realizado),
        )
        .route(
            "/pacientes/:id/historico",
            get(pacientes::historico).post(pacientes::add_historico),
        )
        .route(
            "/pacientes/:id/financeiro",
            get(pacientes::financeiro).post(pacientes::add_lancamento),
        )
        .route(
            "/pacientes/:id/financeiro/totais",
            get(pacientes::financeiro_totais),
        )
        .route(
            "/pacientes/:id/financeiro/:lancamento_id",
            axum::routing::delete(pacientes::delete_lancamento),
        )
        // Agenda
        .route(
            "/agenda/events",
            get(agenda::events).post(agenda::create_event),
        )
        .route(
            "/agenda/events/:id",
            put(agenda::update_event).delete(agenda::delete_event),
        )
        .route("/agenda/events/:id/color", put(agenda::update_color))
        .route("/agenda/events/:id/notes", put(agenda::update_notes))
        .route("/agenda/dentists", get(agenda::dentists))
        .route("/agenda/pacientes", get(agenda::pacientes))
        .route("/agenda/pacientes/search", get(agenda::search_pacientes))
        .route("/agenda/pacientes/telefone", get(agenda::telefone))
        .route(
            "/agenda/holidays",
            get(agenda::holidays).post(agenda::create_holiday),
        )
        .route("/agenda/holidays/range", get(agenda::holidays_range))
        .route("/agenda/holidays/year/:year", get(agenda::holidays_year))
        .route(
            "/agenda/holidays/token",
            get(agenda::token_status)
                .post(agenda::save_token)
                .delete(agenda::delete_token),
        )
        .route("/agenda/holidays/refresh", post(agenda::refresh))
        .route("/agenda/holidays/:date", put(agenda::update_holiday))
        .route("/agenda/cache/clear", post(agenda::clear_cache))
        // Treatment catalogue
        .route(
            "/catalogo/categorias",
            get(catalogo::categorias).post(catalogo::create_categoria),
        )
        .route(
            "/catalogo/categorias/:id",
            get(catalogo::categoria)
                .put(catalogo::update_categoria)
                .delete(catalogo::delete_categoria),
        )
        .route(
            "/catalogo/categorias/:id/tratamentos",
            post(catalogo::create_tratamento),
        )
        .route(
            "/catalogo/tratamentos/:id",
            put(catalogo::update_tratamento).delete(catalogo::delete_tratamento),
        )
        // Prescriptions
        .route("/receitas", get(receitas::index))
        .route(
            "/receitas/modelos",
            get(receitas::modelos).post(receitas::create_modelo),
        )
        .route(
            "/receitas/modelos/:id",
            get(receitas::modelo)
                .put(receitas::update_modelo)
                .delete(receitas::delete_modelo),
        )
        .route("/receitas/medicamentos", get(receitas::medicamentos))
        .route("/receitas/medicamentos/buscar", get(receitas::buscar))
        .route("/receitas/medicamentos/seed", post(receitas::seed))
        .route("/receitas/medicamentos/:id", get(receitas::medicamento))
        .route("/receitas/api/medicamentos", get(receitas::buscar_rapido))
        .route("/receitas/api/dentista/:id", get(receitas::dentista))
        .route("/receitas/pdf", post(receitas::pdf))
        // Certificates
        .route(
            "/atestados",
            get(atestados::list).post(atestados::create),
        )
        .route("/atestados/:id/pdf", get(atestados::pdf))
        // Documents
        .route(
            "/documentos",
            get(documentos::index).post(documentos::create),
        )
        .route("/documentos/historico", get(documentos::historico))
        .route("/documentos/tipos/:tipo", get(documentos::tipo))
        .route("/documentos/gerar/:tipo", post(documentos::generate))
        .route("/documentos/api/:id", get(documentos::summary))
        .route(
            "/documentos/:id",
            put(documentos::update).delete(documentos::delete),
        )
        .route("/documentos/:id/html", get(documentos::html))
        .route("/documentos/:id/pdf", get(documentos::pdf))
        // Tools
        .route("/cro/buscar", get(cro::search))
        .route("/anestesico/calcular", post(anestesico::calculate))
        .route("/anestesico/opcoes", get(anestesico::options))
        .route("/anestesico/padroes", get(anestesico::defaults))
        .route("/ai/status", get(ai::status))
        .route("/ai/chat", post(ai::chat))
        .route("/reports/api/resumo", get(reports::resumo))
        .route("/clinica", get(clinica::get).put(clinica::update))
}

fn build_router(ctx: ApiContext) -> Router {
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension (outermost) → Auth → Audit (innermost) → Handler
    //
    // Extension must be outermost so all middleware can access ApiContext.
    // `.with_state()` converts Router<ApiContext> → Router<()> so the
    // `from_fn` layers (state = ()) are compatible.
    let protected = protected_routes()
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::Extension(ctx.clone()));

    // Unprotected routes (audit only)
    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/login", post(endpoints::auth::login))
        .route("/auth/users", get(endpoints::auth::users))
        .route("/auth/bootstrap", post(endpoints::auth::bootstrap))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::Extension(ctx));

    Router::new()
        .nest("/api", protected.merge(unprotected))
        .layer(TraceLayer::new_for_http())
}
