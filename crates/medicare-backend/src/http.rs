use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Json, Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};

use futures_util::{Stream, StreamExt, future};

use serde::Serialize;

use tokio_stream::wrappers::BroadcastStream;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tracing::{error, warn};

use crate::command::CommandRequest;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{Error, ErrorKind};
use crate::fanout::Fanout;
use crate::model::{
    Config, ConfigUpdate, Device, DeviceAction, DeviceActionParam, DeviceActionParamUpdate,
    DeviceActionUpdate, DeviceField, DeviceFieldUpdate, DeviceTypeUpdate, DeviceUpdate, Id,
    NewConfig, NewDevice, NewDeviceAction, NewDeviceActionParam, NewDeviceField, NewDeviceType,
    NewUser, User, UserUpdate,
};
use crate::registry::{ActionView, DeviceTypeView, SchemaRegistry};
use crate::relay::Publisher;
use crate::store::Store;

/// A response describing an error.
///
/// The body contains the error kind and its description. Internal errors
/// are only described in the logs.
pub struct ErrorResponse(Response);

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    description: &'a str,
}

impl From<Error> for ErrorResponse {
    fn from(e: Error) -> Self {
        let status = match e.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Transport => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let description = if e.kind() == ErrorKind::Internal {
            error!("{e}");
            "An internal error occurred."
        } else {
            e.description()
        };

        let body = ErrorBody {
            error: e.kind().to_string(),
            description,
        };
        Self((status, Json(body)).into_response())
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        self.0
    }
}

type HttpResult<T> = std::result::Result<Json<T>, ErrorResponse>;

fn found<T>(entity: Option<T>, what: &str, id: Id) -> std::result::Result<T, ErrorResponse> {
    entity.ok_or_else(|| {
        Error::not_found(format!("The {what} with identifier {id} does not exist.")).into()
    })
}

/// The entities and their schemas.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn Store>,
    registry: SchemaRegistry,
}

impl Catalog {
    /// Creates a [`Catalog`] over a [`Store`].
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            registry: SchemaRegistry::new(Arc::clone(&store)),
            store,
        }
    }
}

/// The state shared by all HTTP handlers.
pub struct AppState<P: Publisher> {
    catalog: Catalog,
    dispatcher: Arc<Dispatcher<P>>,
    fanout: Fanout,
}

// A derived implementation would require `P: Clone`.
impl<P: Publisher> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            fanout: self.fanout.clone(),
        }
    }
}

impl<P: Publisher> AppState<P> {
    /// Creates an [`AppState`].
    #[must_use]
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher<P>, fanout: Fanout) -> Self {
        Self {
            catalog: Catalog::new(store),
            dispatcher: Arc::new(dispatcher),
            fanout,
        }
    }
}

impl<P: Publisher> FromRef<AppState<P>> for Catalog {
    fn from_ref(state: &AppState<P>) -> Self {
        state.catalog.clone()
    }
}

impl<P: Publisher> FromRef<AppState<P>> for Fanout {
    fn from_ref(state: &AppState<P>) -> Self {
        state.fanout.clone()
    }
}

/// Builds the HTTP router.
pub fn router<P: Publisher>(state: AppState<P>) -> Router {
    Router::new()
        .route("/health", get(health::<P>))
        .route("/events", get(events))
        .route("/device/command/{id}", post(send_command::<P>))
        .route("/device", get(list_devices).post(create_device))
        .route(
            "/device/{id}",
            get(get_device).patch(update_device).delete(delete_device),
        )
        .route(
            "/device_type",
            get(list_device_types).post(create_device_type),
        )
        .route(
            "/device_type/{id}",
            get(get_device_type)
                .patch(update_device_type)
                .delete(delete_device_type),
        )
        .route("/device_type/action", post(create_action))
        .route(
            "/device_type/action/{id}",
            get(get_action).patch(update_action).delete(delete_action),
        )
        .route("/device_type/action/param", post(create_param))
        .route(
            "/device_type/action/param/{id}",
            get(get_param).patch(update_param).delete(delete_param),
        )
        .route("/device_type/field", post(create_field))
        .route(
            "/device_type/field/{id}",
            get(get_field).patch(update_field).delete(delete_field),
        )
        .route("/user", get(list_users).post(create_user))
        .route(
            "/user/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/config", get(list_configs).post(create_config))
        .route(
            "/config/{id}",
            get(get_config).patch(update_config).delete(delete_config),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    pending_commands: usize,
    realtime_clients: usize,
}

async fn health<P: Publisher>(State(state): State<AppState<P>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        pending_commands: state.dispatcher.correlations().len(),
        realtime_clients: state.fanout.clients(),
    })
}

async fn events(
    State(fanout): State<Fanout>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let closed = fanout.closed();
    let stream = BroadcastStream::new(fanout.subscribe())
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) => Some(Ok(Event::default()
                    .event(event.channel())
                    .data(event.payload().to_string()))),
                Err(e) => {
                    warn!("Real-time client too slow: {e}");
                    None
                }
            })
        })
        .take_until(closed.cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn send_command<P: Publisher>(
    State(state): State<AppState<P>>,
    Path(id): Path<Id>,
    Json(request): Json<CommandRequest>,
) -> HttpResult<DispatchOutcome> {
    Ok(Json(state.dispatcher.dispatch(id, &request).await?))
}

async fn list_devices(State(catalog): State<Catalog>) -> HttpResult<Vec<Device>> {
    Ok(Json(catalog.store.devices()?))
}

async fn create_device(
    State(catalog): State<Catalog>,
    Json(new): Json<NewDevice>,
) -> HttpResult<Device> {
    Ok(Json(catalog.store.insert_device(new)?))
}

async fn get_device(State(catalog): State<Catalog>, Path(id): Path<Id>) -> HttpResult<Device> {
    Ok(Json(found(catalog.store.device(id)?, "device", id)?))
}

async fn update_device(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
    Json(update): Json<DeviceUpdate>,
) -> HttpResult<Device> {
    Ok(Json(catalog.store.update_device(id, update)?))
}

async fn delete_device(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> std::result::Result<StatusCode, ErrorResponse> {
    catalog.store.delete_device(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_device_types(State(catalog): State<Catalog>) -> HttpResult<Vec<DeviceTypeView>> {
    let views = catalog
        .store
        .device_types()?
        .into_iter()
        .map(|device_type| catalog.registry.device_type_view(device_type))
        .collect::<crate::error::Result<Vec<_>>>()?;
    Ok(Json(views))
}

async fn create_device_type(
    State(catalog): State<Catalog>,
    Json(new): Json<NewDeviceType>,
) -> HttpResult<DeviceTypeView> {
    let device_type = catalog.store.insert_device_type(new)?;
    Ok(Json(catalog.registry.device_type_view(device_type)?))
}

async fn get_device_type(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> HttpResult<DeviceTypeView> {
    let device_type = found(catalog.store.device_type(id)?, "device type", id)?;
    Ok(Json(catalog.registry.device_type_view(device_type)?))
}

async fn update_device_type(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
    Json(update): Json<DeviceTypeUpdate>,
) -> HttpResult<DeviceTypeView> {
    let device_type = catalog.store.update_device_type(id, update)?;
    Ok(Json(catalog.registry.device_type_view(device_type)?))
}

async fn delete_device_type(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> std::result::Result<StatusCode, ErrorResponse> {
    catalog.store.delete_device_type(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_action(
    State(catalog): State<Catalog>,
    Json(new): Json<NewDeviceAction>,
) -> HttpResult<DeviceAction> {
    Ok(Json(catalog.store.insert_action(new)?))
}

async fn get_action(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> HttpResult<ActionView> {
    let action = found(catalog.store.action(id)?, "action", id)?;
    Ok(Json(catalog.registry.action_view(action)?))
}

async fn update_action(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
    Json(update): Json<DeviceActionUpdate>,
) -> HttpResult<DeviceAction> {
    Ok(Json(catalog.store.update_action(id, update)?))
}

async fn delete_action(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> std::result::Result<StatusCode, ErrorResponse> {
    catalog.store.delete_action(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_param(
    State(catalog): State<Catalog>,
    Json(new): Json<NewDeviceActionParam>,
) -> HttpResult<DeviceActionParam> {
    Ok(Json(catalog.store.insert_param(new)?))
}

async fn get_param(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> HttpResult<DeviceActionParam> {
    Ok(Json(found(catalog.store.param(id)?, "parameter", id)?))
}

async fn update_param(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
    Json(update): Json<DeviceActionParamUpdate>,
) -> HttpResult<DeviceActionParam> {
    Ok(Json(catalog.store.update_param(id, update)?))
}

async fn delete_param(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> std::result::Result<StatusCode, ErrorResponse> {
    catalog.store.delete_param(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_field(
    State(catalog): State<Catalog>,
    Json(new): Json<NewDeviceField>,
) -> HttpResult<DeviceField> {
    Ok(Json(catalog.store.insert_field(new)?))
}

async fn get_field(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> HttpResult<DeviceField> {
    Ok(Json(found(catalog.store.field(id)?, "field", id)?))
}

async fn update_field(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
    Json(update): Json<DeviceFieldUpdate>,
) -> HttpResult<DeviceField> {
    Ok(Json(catalog.store.update_field(id, update)?))
}

async fn delete_field(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> std::result::Result<StatusCode, ErrorResponse> {
    catalog.store.delete_field(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// A user together with the devices linked to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    /// User data.
    #[serde(flatten)]
    pub user: User,
    /// Linked devices.
    pub devices: Vec<Device>,
}

impl Catalog {
    fn user_view(&self, user: User) -> crate::error::Result<UserView> {
        let devices = self.store.devices_of_user(user.id)?;
        Ok(UserView { user, devices })
    }
}

async fn list_users(State(catalog): State<Catalog>) -> HttpResult<Vec<UserView>> {
    let views = catalog
        .store
        .users()?
        .into_iter()
        .map(|user| catalog.user_view(user))
        .collect::<crate::error::Result<Vec<_>>>()?;
    Ok(Json(views))
}

async fn create_user(
    State(catalog): State<Catalog>,
    Json(new): Json<NewUser>,
) -> HttpResult<UserView> {
    let user = catalog.store.insert_user(new)?;
    Ok(Json(catalog.user_view(user)?))
}

async fn get_user(State(catalog): State<Catalog>, Path(id): Path<Id>) -> HttpResult<UserView> {
    let user = found(catalog.store.user(id)?, "user", id)?;
    Ok(Json(catalog.user_view(user)?))
}

async fn update_user(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
    Json(update): Json<UserUpdate>,
) -> HttpResult<UserView> {
    let user = catalog.store.update_user(id, update)?;
    Ok(Json(catalog.user_view(user)?))
}

async fn delete_user(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> std::result::Result<StatusCode, ErrorResponse> {
    catalog.store.delete_user(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_configs(State(catalog): State<Catalog>) -> HttpResult<Vec<Config>> {
    Ok(Json(catalog.store.configs()?))
}

async fn create_config(
    State(catalog): State<Catalog>,
    Json(new): Json<NewConfig>,
) -> HttpResult<Config> {
    Ok(Json(catalog.store.insert_config(new)?))
}

async fn get_config(State(catalog): State<Catalog>, Path(id): Path<Id>) -> HttpResult<Config> {
    Ok(Json(found(catalog.store.config(id)?, "config", id)?))
}

async fn update_config(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
    Json(update): Json<ConfigUpdate>,
) -> HttpResult<Config> {
    Ok(Json(catalog.store.update_config(id, update)?))
}

async fn delete_config(
    State(catalog): State<Catalog>,
    Path(id): Path<Id>,
) -> std::result::Result<StatusCode, ErrorResponse> {
    catalog.store.delete_config(id)?;
    Ok(StatusCode::NO_CONTENT)
}
