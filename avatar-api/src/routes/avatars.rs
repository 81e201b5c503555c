use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, OriginalUri, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::Form;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::instrument;

use crate::{
    app_state::AppState,
    auth::AuthUser,
    domain::{
        dispatch::{self, DispatchTarget},
        geometry,
        models::{Avatar, AvatarId, CropRegion, UserId},
        redirect,
    },
    routes::ApiError,
};

const CHANGE_ROUTE: &str = "/avatars/change";
const DELETE_ROUTE: &str = "/avatars/delete";

// Allow multipart overhead on top of the configured payload policy.
const UPLOAD_BODY_LIMIT: usize = 8 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add", get(add_page).post(add))
        .route_layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .route("/change", get(change_page).post(change))
        .route("/delete", get(delete_page).post(delete))
        .route("/change_crop_delete", post(change_crop_delete))
        .route("/crop/:avatar_id", get(crop_page).post(crop))
        .route("/render_primary/:user_id/:size", get(render_primary))
        .route("/:avatar_id/image/:size", get(serve_image))
}

#[derive(Debug, Deserialize)]
struct NextUrl {
    next: Option<String>,
}

/// Form values arrive as strings; one that fails to parse counts as absent
/// rather than failing the whole request.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
{
    Ok(Option::<String>::deserialize(deserializer)?.and_then(|raw| raw.parse().ok()))
}

/// The state a template would render: current primary, the bounded list, the
/// resolved redirect target, and any field errors.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AvatarPage {
    avatar: Option<AvatarView>,
    avatars: Vec<AvatarView>,
    next: String,
    errors: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AvatarView {
    id: AvatarId,
    url: String,
    primary: bool,
    width: i32,
    height: i32,
}

impl AvatarView {
    fn new(avatar: &Avatar, app_state: &AppState) -> Self {
        let size = app_state.avatar_service.settings().default_size;
        Self {
            id: avatar.id,
            url: app_state.avatar_service.avatar_url(avatar, size),
            primary: avatar.primary,
            width: avatar.width,
            height: avatar.height,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CropPage {
    avatar: AvatarView,
    orig_size: (u32, u32),
    display_size: (u32, u32),
    preview_size: (u32, u32),
    initial_crop: u32,
    next: String,
    errors: Vec<String>,
}

async fn avatar_page(
    app_state: &AppState,
    owner: UserId,
    next: String,
    errors: Vec<String>,
) -> Result<Json<AvatarPage>, ApiError> {
    let selection = app_state.avatar_service.page(owner).await?;

    Ok(Json(AvatarPage {
        avatar: selection.primary.as_ref().map(|a| AvatarView::new(a, app_state)),
        avatars: selection
            .avatars
            .iter()
            .map(|a| AvatarView::new(a, app_state))
            .collect(),
        next,
        errors,
    }))
}

fn crop_page_body(
    app_state: &AppState,
    avatar: &Avatar,
    next: String,
    errors: Vec<String>,
) -> Json<CropPage> {
    let settings = app_state.avatar_service.settings();
    let display = geometry::compute_display_box(
        avatar.width as u32,
        avatar.height as u32,
        settings.crop_view_size,
    );

    Json(CropPage {
        avatar: AvatarView::new(avatar, app_state),
        orig_size: (avatar.width as u32, avatar.height as u32),
        display_size: (display.width, display.height),
        preview_size: (settings.default_size, settings.default_size),
        initial_crop: display.initial_crop_size(),
        next,
        errors,
    })
}

fn referer(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::REFERER).and_then(|v| v.to_str().ok())
}

fn resolve_target(
    form_next: Option<&str>,
    query_next: Option<&str>,
    headers: &HeaderMap,
    uri: &Uri,
) -> String {
    redirect::resolve_next(None, form_next, query_next, referer(headers), uri.path())
}

async fn add_page(
    user: AuthUser,
    State(app_state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(NextUrl { next }): Query<NextUrl>,
    headers: HeaderMap,
) -> Result<Json<AvatarPage>, ApiError> {
    let next = resolve_target(None, next.as_deref(), &headers, &uri);
    avatar_page(&app_state, user.id, next, Vec::new()).await
}

#[instrument(name = "POST /avatars/add", skip_all, fields(user = %user.id))]
async fn add(
    user: AuthUser,
    State(app_state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(NextUrl { next }): Query<NextUrl>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = extract_upload(&mut multipart).await?;
    let next = resolve_target(upload.next.as_deref(), next.as_deref(), &headers, &uri);

    // No file submitted: render the current state with the field error,
    // mutate nothing.
    let errors = upload.validation_errors();
    let Some((payload, content_type)) = upload.file else {
        return Ok(avatar_page(&app_state, user.id, next, errors)
            .await?
            .into_response());
    };

    match app_state
        .avatar_service
        .upload(user.id, payload, content_type)
        .await
    {
        Ok(avatar) => {
            tracing::info!("Successfully uploaded avatar {} for {}", avatar.id, user.id);
            Ok(Redirect::to(&next).into_response())
        }
        Err(err) if err.is_validation() => Ok(avatar_page(
            &app_state,
            user.id,
            next,
            vec![err.to_string()],
        )
        .await?
        .into_response()),
        Err(err) => Err(err.into()),
    }
}

struct Upload {
    file: Option<(Vec<u8>, Option<String>)>,
    next: Option<String>,
}

impl Upload {
    /// Field errors a bound upload form would report.
    fn validation_errors(&self) -> Vec<String> {
        match self.file {
            Some(_) => Vec::new(),
            None => vec!["no file submitted".to_string()],
        }
    }
}

async fn extract_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload {
        file: None,
        next: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("failed to parse multipart field"))?
    {
        match field.name() {
            Some("avatar") => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::bad_request("failed to read avatar payload"))?;
                upload.file = Some((bytes.to_vec(), content_type));
            }
            Some("next") => {
                upload.next = field.text().await.ok();
            }
            _ => continue,
        }
    }

    Ok(upload)
}

async fn change_page(
    user: AuthUser,
    State(app_state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(NextUrl { next }): Query<NextUrl>,
    headers: HeaderMap,
) -> Result<Json<AvatarPage>, ApiError> {
    let next = resolve_target(None, next.as_deref(), &headers, &uri);
    avatar_page(&app_state, user.id, next, Vec::new()).await
}

#[derive(Debug, Deserialize)]
struct ChangeForm {
    #[serde(default, deserialize_with = "lenient")]
    choice: Option<i32>,
    next: Option<String>,
}

/// POST always redirects; a missing or foreign `choice` silently mutates
/// nothing.
async fn change(
    user: AuthUser,
    State(app_state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(NextUrl { next }): Query<NextUrl>,
    headers: HeaderMap,
    Form(form): Form<ChangeForm>,
) -> Result<Redirect, ApiError> {
    let next = resolve_target(form.next.as_deref(), next.as_deref(), &headers, &uri);

    if let Some(choice) = form.choice {
        let updated = app_state
            .avatar_service
            .set_primary(user.id, AvatarId::new(choice))
            .await?;
        if let Some(avatar) = updated {
            tracing::info!("Avatar {} is now primary for {}", avatar.id, user.id);
        }
    }

    Ok(Redirect::to(&next))
}

async fn delete_page(
    user: AuthUser,
    State(app_state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(NextUrl { next }): Query<NextUrl>,
    headers: HeaderMap,
) -> Result<Json<AvatarPage>, ApiError> {
    let next = resolve_target(None, next.as_deref(), &headers, &uri);
    avatar_page(&app_state, user.id, next, Vec::new()).await
}

#[derive(Debug, Deserialize)]
struct DeleteForm {
    #[serde(default)]
    choices: Vec<i32>,
    next: Option<String>,
}

#[instrument(name = "POST /avatars/delete", skip_all, fields(user = %user.id))]
async fn delete(
    user: AuthUser,
    State(app_state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(NextUrl { next }): Query<NextUrl>,
    headers: HeaderMap,
    Form(form): Form<DeleteForm>,
) -> Result<Response, ApiError> {
    let next = resolve_target(form.next.as_deref(), next.as_deref(), &headers, &uri);
    let ids: Vec<AvatarId> = form.choices.iter().copied().map(AvatarId::new).collect();

    match app_state.avatar_service.delete(user.id, &ids).await {
        Ok(deleted) => {
            tracing::info!("Deleted {} avatar(s) for {}", deleted, user.id);
            Ok(Redirect::to(&next).into_response())
        }
        Err(err) if err.is_validation() => Ok(avatar_page(
            &app_state,
            user.id,
            next,
            vec![err.to_string()],
        )
        .await?
        .into_response()),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Deserialize)]
struct DispatchForm {
    change: Option<String>,
    crop: Option<String>,
    delete: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    choice: Option<i32>,
}

/// Form values are truthy when present and non-empty, matching the combined
/// form's submit buttons.
fn flag(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

async fn change_crop_delete(
    _user: AuthUser,
    Form(form): Form<DispatchForm>,
) -> Redirect {
    let target = dispatch::dispatch(
        flag(&form.change),
        flag(&form.crop),
        flag(&form.delete),
        form.choice.map(AvatarId::new),
    );

    match target {
        DispatchTarget::Change => Redirect::to(CHANGE_ROUTE),
        DispatchTarget::Crop(id) => Redirect::to(&format!("/avatars/crop/{id}")),
        DispatchTarget::Delete => Redirect::to(DELETE_ROUTE),
    }
}

async fn crop_page(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(avatar_id): Path<i32>,
    OriginalUri(uri): OriginalUri,
    Query(NextUrl { next }): Query<NextUrl>,
    headers: HeaderMap,
) -> Result<Json<CropPage>, ApiError> {
    let avatar = app_state
        .avatar_service
        .owned_avatar(user.id, AvatarId::new(avatar_id))
        .await?
        .ok_or_else(|| ApiError::not_found("avatar not found"))?;

    let next = resolve_target(None, next.as_deref(), &headers, &uri);
    Ok(crop_page_body(&app_state, &avatar, next, Vec::new()))
}

#[derive(Debug, Deserialize)]
struct CropForm {
    #[serde(default, deserialize_with = "lenient")]
    x: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    y: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    w: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    h: Option<u32>,
    next: Option<String>,
}

impl CropForm {
    fn region(&self) -> Option<CropRegion> {
        Some(CropRegion {
            x: self.x?,
            y: self.y?,
            width: self.w?,
            height: self.h?,
        })
    }
}

#[instrument(name = "POST /avatars/crop", skip_all, fields(user = %user.id, avatar = avatar_id))]
async fn crop(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(avatar_id): Path<i32>,
    OriginalUri(uri): OriginalUri,
    Query(NextUrl { next }): Query<NextUrl>,
    headers: HeaderMap,
    Form(form): Form<CropForm>,
) -> Result<Response, ApiError> {
    let id = AvatarId::new(avatar_id);
    let avatar = app_state
        .avatar_service
        .owned_avatar(user.id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("avatar not found"))?;

    let next = resolve_target(form.next.as_deref(), next.as_deref(), &headers, &uri);

    let Some(region) = form.region() else {
        let body = crop_page_body(
            &app_state,
            &avatar,
            next,
            vec!["incomplete crop region".to_string()],
        );
        return Ok(body.into_response());
    };

    match app_state.avatar_service.crop(user.id, id, region).await {
        Ok(avatar) => {
            tracing::info!("Successfully cropped avatar {} for {}", avatar.id, user.id);
            Ok(Redirect::to(&next).into_response())
        }
        Err(err) if err.is_validation() => {
            let body = crop_page_body(&app_state, &avatar, next, vec![err.to_string()]);
            Ok(body.into_response())
        }
        Err(err) => Err(err.into()),
    }
}

/// Anonymous: resolves a user's primary avatar at the requested size and
/// redirects to it, falling back to the configured default avatar.
#[instrument(name = "GET /avatars/render_primary", skip(app_state))]
async fn render_primary(
    State(app_state): State<AppState>,
    Path((user_id, size)): Path<(i32, u32)>,
) -> Redirect {
    let owner = UserId::new(user_id);

    match app_state.avatar_service.primary_url(owner, size).await {
        Ok(Some(url)) => Redirect::to(&url),
        Ok(None) => Redirect::to(&app_state.avatar_service.settings().default_avatar_url),
        Err(err) => {
            tracing::warn!("Primary avatar lookup failed for {}: {}", owner, err);
            Redirect::to(&app_state.avatar_service.settings().default_avatar_url)
        }
    }
}

const AVATAR_CACHE_CONTROL: &str = "public, max-age=3600";
const DEFAULT_AVATAR_MIME: &str = "image/webp";

/// Serves a stored avatar scaled to `size`. URLs carry an `updated_at`
/// fingerprint, so responses can be cached aggressively.
async fn serve_image(
    State(app_state): State<AppState>,
    Path((avatar_id, size)): Path<(i32, u32)>,
) -> Result<Response, ApiError> {
    let rendered = app_state
        .avatar_service
        .render_image(AvatarId::new(avatar_id), size)
        .await?;

    let mut response = Response::new(Body::from(rendered.bytes));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&rendered.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_AVATAR_MIME)),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(AVATAR_CACHE_CONTROL),
    );

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_change_choice_counts_as_absent() {
        let form: ChangeForm =
            serde_json::from_str(r#"{"choice":"abc","next":"/profile"}"#).unwrap();
        assert!(form.choice.is_none());
        assert_eq!(form.next.as_deref(), Some("/profile"));

        let form: ChangeForm = serde_json::from_str(r#"{"choice":"7"}"#).unwrap();
        assert_eq!(form.choice, Some(7));
    }

    #[test]
    fn unparseable_dispatch_choice_counts_as_absent() {
        let form: DispatchForm =
            serde_json::from_str(r#"{"crop":"crop","choice":"abc"}"#).unwrap();
        assert!(form.choice.is_none());

        // Without a usable choice the dispatcher falls back to the change
        // route instead of rejecting the request.
        let target = dispatch::dispatch(
            flag(&form.change),
            flag(&form.crop),
            flag(&form.delete),
            form.choice.map(AvatarId::new),
        );
        assert!(matches!(target, DispatchTarget::Change));
    }

    #[test]
    fn malformed_crop_coordinate_yields_no_region() {
        let form: CropForm =
            serde_json::from_str(r#"{"x":"0","y":"0","w":"oops","h":"10"}"#).unwrap();
        assert!(form.region().is_none());

        let form: CropForm =
            serde_json::from_str(r#"{"x":"10","y":"20","w":"300","h":"400"}"#).unwrap();
        assert_eq!(
            form.region(),
            Some(CropRegion {
                x: 10,
                y: 20,
                width: 300,
                height: 400,
            })
        );
    }

    #[test]
    fn upload_without_a_file_reports_a_field_error() {
        let upload = Upload {
            file: None,
            next: None,
        };
        assert_eq!(upload.validation_errors(), vec!["no file submitted".to_string()]);

        let upload = Upload {
            file: Some((vec![1], None)),
            next: None,
        };
        assert!(upload.validation_errors().is_empty());
    }
}
