use crate::dashboard::{self, Dashboard, Visualization};
use crate::errors::AppError;
use crate::models::{DashboardResponse, DataSource, ViewQuery, ViewResponse};
use crate::session::{Session, StoredUpload};
use crate::source::generate_sample;
use crate::state::AppState;
use crate::ui::render_index;
use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::HeaderMap,
    response::{Html, Redirect, Response},
};
use tracing::info;

const UPLOAD_FIELD: &str = "file";
const UPLOAD_REDIRECT: &str = "/?source=upload";

pub async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> Response {
    let session = Session::from_headers(&headers);
    let dashboard = render_dashboard(&state, session, &query).await;
    session.respond(Html(render_index(&dashboard)))
}

pub async fn get_dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> Response {
    let session = Session::from_headers(&headers);
    let dashboard = render_dashboard(&state, session, &query).await;
    session.respond(Json(to_response(dashboard)))
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let session = Session::from_headers(&headers);

    let mut stored = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        stored = Some(StoredUpload {
            file_name,
            bytes,
        });
    }

    let Some(file) = stored else {
        return Err(AppError::bad_request("multipart field 'file' is required"));
    };

    // Browsers send an empty, unnamed part when no file was picked.
    if file.file_name.is_empty() && file.bytes.is_empty() {
        return Ok(session.respond(Redirect::to(UPLOAD_REDIRECT)));
    }

    info!(file = %file.file_name, bytes = file.bytes.len(), "stored upload");
    state.sessions.lock().await.store_upload(session.id, file);
    Ok(session.respond(Redirect::to(UPLOAD_REDIRECT)))
}

pub async fn clear_upload(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = Session::from_headers(&headers);
    state.sessions.lock().await.clear_upload(session.id);
    session.respond(Redirect::to(UPLOAD_REDIRECT))
}

async fn render_dashboard(state: &AppState, session: Session, query: &ViewQuery) -> Dashboard {
    let source = query.data_source();
    // Only the memo lookups run under the lock; parsing happens after it.
    let (upload, sample) = {
        let mut sessions = state.sessions.lock().await;
        let upload = sessions.upload(session.id);
        let sample = match (source, &upload) {
            (DataSource::Upload, Some(_)) => None,
            _ => Some(sessions.sample(session.id, source, generate_sample)),
        };
        (upload, sample)
    };
    let ctx = dashboard::acquire(source, upload.as_ref(), move || {
        sample.unwrap_or_else(generate_sample)
    });
    dashboard::build(ctx, query)
}

fn to_response(dashboard: Dashboard) -> DashboardResponse {
    let view = match dashboard.visualization {
        Visualization::Hidden => ViewResponse::Hidden,
        Visualization::NoNumericColumns(notice) => ViewResponse::NoNumericColumns {
            message: notice.message,
        },
        Visualization::Empty(notice) => ViewResponse::Empty {
            message: notice.message,
        },
        Visualization::Ready(panels) => {
            let chart_error = panels.chart_error();
            let panels = *panels;
            ViewResponse::Ready {
                x: panels.x,
                y: panels.y,
                row_count: panels.row_count,
                chart: panels.chart.ok(),
                chart_error,
                summary: panels.summary,
            }
        }
    };

    let (columns, rows) = match dashboard.dataset {
        Some(data) => (data.columns, data.rows),
        None => (Vec::new(), Vec::new()),
    };
    let (options, selection) = match dashboard.config {
        Some(config) => (Some(config.options), Some(config.selection)),
        None => (None, None),
    };

    DashboardResponse {
        source: dashboard.source,
        upload: dashboard.upload,
        notices: dashboard.notices,
        columns,
        rows,
        numeric_columns: dashboard.numeric_columns,
        options,
        selection,
        view,
    }
}
