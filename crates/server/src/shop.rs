//! Storefront pages.
//!
//! - `GET  /`                  catalog listing
//! - `GET  /buy/{product_id}`  purchase form for one product
//! - `POST /buy/{product_id}`  submit a purchase, redirects to `/` on success

use std::sync::Arc;

use axum::{
    extract::{Form, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use storefront_core::domain::product::{Product, ProductId};
use storefront_core::domain::purchase::NewPurchase;
use storefront_core::errors::{ApplicationError, DomainError, InterfaceError};
use storefront_db::{
    DbPool, ProductRepository, PurchaseRepository, RepositoryError, SqlProductRepository,
    SqlPurchaseRepository,
};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const OUT_OF_STOCK_MESSAGE: &str = "Товара нет в наличии";

#[derive(Clone)]
pub struct ShopState {
    products: Arc<dyn ProductRepository>,
    purchases: Arc<dyn PurchaseRepository>,
    templates: Arc<Tera>,
}

impl ShopState {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        purchases: Arc<dyn PurchaseRepository>,
    ) -> Result<Self, tera::Error> {
        Ok(Self { products, purchases, templates: init_templates()? })
    }

    pub fn from_pool(pool: DbPool) -> Result<Self, tera::Error> {
        Self::new(
            Arc::new(SqlProductRepository::new(pool.clone())),
            Arc::new(SqlPurchaseRepository::new(pool)),
        )
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PurchaseForm {
    #[serde(default)]
    pub person: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: &'static str,
    message: String,
}

#[derive(Debug, Error)]
pub enum ShopError {
    #[error("product {0} is out of stock")]
    OutOfStock(ProductId),
    #[error(transparent)]
    Interface(#[from] InterfaceError),
    #[error("template rendering failed: {0}")]
    Template(#[from] tera::Error),
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        match self {
            Self::OutOfStock(_) => {
                (StatusCode::BAD_REQUEST, OUT_OF_STOCK_MESSAGE).into_response()
            }
            Self::Interface(error) => {
                let status = match &error {
                    InterfaceError::BadRequest { .. }
                    | InterfaceError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
                    InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
                    InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.user_message()).into_response()
            }
            Self::Template(error) => {
                error!(
                    event_name = "shop.template.error",
                    error = ?error,
                    "template rendering failed"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, "An unexpected internal error occurred.")
                    .into_response()
            }
        }
    }
}

fn init_templates() -> Result<Arc<Tera>, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("base.html", include_str!("../../../templates/shop/base.html")),
        ("index.html", include_str!("../../../templates/shop/index.html")),
        ("purchase_form.html", include_str!("../../../templates/shop/purchase_form.html")),
    ])?;
    Ok(Arc::new(tera))
}

pub fn router(state: ShopState) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/buy/{product_id}", get(purchase_page).post(submit_purchase))
        .with_state(state)
}

fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn repository_failure(error: RepositoryError, correlation_id: &str) -> ShopError {
    if !matches!(error, RepositoryError::Domain(_)) {
        error!(
            event_name = "shop.repository.error",
            correlation_id = %correlation_id,
            error = %error,
            "storage operation failed"
        );
    }
    ApplicationError::from(error).into_interface(correlation_id).into()
}

fn not_found(what: String, correlation_id: &str) -> ShopError {
    ApplicationError::NotFound(what).into_interface(correlation_id).into()
}

fn product_not_found(product_id: ProductId, correlation_id: &str) -> ShopError {
    not_found(format!("product {product_id}"), correlation_id)
}

/// Product ids in paths are unsigned decimal integers; anything else names no
/// product.
fn parse_product_id(raw: &str, correlation_id: &str) -> Result<ProductId, ShopError> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(not_found(format!("path segment `{raw}`"), correlation_id));
    }
    raw.parse()
        .map(ProductId)
        .map_err(|_| not_found(format!("path segment `{raw}`"), correlation_id))
}

async fn load_product(
    state: &ShopState,
    product_id: ProductId,
    correlation_id: &str,
) -> Result<Product, ShopError> {
    state
        .products
        .find_by_id(product_id)
        .await
        .map_err(|error| repository_failure(error, correlation_id))?
        .ok_or_else(|| product_not_found(product_id, correlation_id))
}

fn render_form(
    state: &ShopState,
    product: &Product,
    form: &PurchaseForm,
    errors: &[FieldError],
) -> Result<Html<String>, ShopError> {
    let mut context = Context::new();
    context.insert("product", product);
    context.insert("form", form);
    context.insert("errors", errors);
    Ok(Html(state.templates.render("purchase_form.html", &context)?))
}

async fn index_page(State(state): State<ShopState>) -> Result<Html<String>, ShopError> {
    let correlation_id = correlation_id();
    let products = state
        .products
        .list_all()
        .await
        .map_err(|error| repository_failure(error, &correlation_id))?;

    let mut context = Context::new();
    context.insert("products", &products);
    Ok(Html(state.templates.render("index.html", &context)?))
}

async fn purchase_page(
    Path(raw_id): Path<String>,
    State(state): State<ShopState>,
) -> Result<Html<String>, ShopError> {
    let correlation_id = correlation_id();
    let product_id = parse_product_id(&raw_id, &correlation_id)?;
    let product = load_product(&state, product_id, &correlation_id).await?;
    render_form(&state, &product, &PurchaseForm::default(), &[])
}

async fn submit_purchase(
    Path(raw_id): Path<String>,
    State(state): State<ShopState>,
    Form(form): Form<PurchaseForm>,
) -> Result<Response, ShopError> {
    let correlation_id = correlation_id();
    let product_id = parse_product_id(&raw_id, &correlation_id)?;
    let product = load_product(&state, product_id, &correlation_id).await?;

    let request = NewPurchase::new(product_id, form.person.clone(), form.address.clone());
    let field_errors: Vec<FieldError> = request
        .field_errors()
        .into_iter()
        .map(|(field, message)| FieldError { field: field.as_str(), message })
        .collect();
    if !field_errors.is_empty() {
        return Ok(render_form(&state, &product, &form, &field_errors)?.into_response());
    }

    // Advisory only: the locked check inside `create` decides.
    if !product.in_stock() {
        info!(
            event_name = "shop.purchase.sold_out",
            correlation_id = %correlation_id,
            product_id = product_id.0,
            "purchase refused before submission: product sold out"
        );
        return Err(ShopError::OutOfStock(product_id));
    }

    match state.purchases.create(request).await {
        Ok(purchase) => {
            info!(
                event_name = "shop.purchase.accepted",
                correlation_id = %correlation_id,
                product_id = product_id.0,
                purchase_id = purchase.id.0,
                "purchase accepted"
            );
            Ok((StatusCode::FOUND, [(header::LOCATION, "/")]).into_response())
        }
        Err(RepositoryError::Domain(DomainError::Validation(message))) => {
            warn!(
                event_name = "shop.purchase.product_vanished",
                correlation_id = %correlation_id,
                product_id = product_id.0,
                detail = %message,
                "product disappeared before the purchase committed"
            );
            Err(product_not_found(product_id, &correlation_id))
        }
        Err(error) => {
            if error.is_insufficient_stock() {
                warn!(
                    event_name = "shop.purchase.stock_race_lost",
                    correlation_id = %correlation_id,
                    product_id = product_id.0,
                    "stock ran out between pre-check and commit"
                );
            }
            Err(repository_failure(error, &correlation_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use storefront_core::config::DatabaseConfig;
    use storefront_core::domain::product::{NewProduct, Product, ProductId};
    use storefront_core::domain::purchase::NewPurchase;
    use storefront_db::{
        connect, migrations, InMemoryStorefront, ProductRepository,
        PurchaseRepository, RepositoryError, SqlProductRepository, SqlPurchaseRepository,
    };
    use tower::ServiceExt;

    use super::{router, ShopState};

    fn in_memory_app() -> (Arc<InMemoryStorefront>, Router) {
        let store = Arc::new(InMemoryStorefront::default());
        let state = ShopState::new(store.clone(), store.clone()).expect("templates compile");
        (store, router(state))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Option<String>, String) {
        let response = app.oneshot(request).await.expect("router responds");
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        (status, location, String::from_utf8_lossy(&bytes).into_owned())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn post_form(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request")
    }

    async fn add(store: &InMemoryStorefront, name: &str, price: i64, quantity: i64) -> Product {
        store
            .insert(NewProduct::new(name, price).with_quantity(quantity))
            .await
            .expect("insert product")
    }

    #[tokio::test]
    async fn index_responds_on_empty_catalog() {
        let (_store, app) = in_memory_app();
        let (status, _, body) = send(app, get("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Каталог пуст"));
    }

    #[tokio::test]
    async fn index_shows_quantity_and_hides_buy_link_when_sold_out() {
        let (store, app) = in_memory_app();
        add(&store, "Телефон", 30_000, 7).await;
        add(&store, "Наушники", 5_000, 0).await;

        let (status, _, body) = send(app, get("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("7 шт."));
        assert!(body.contains("Нет в наличии"));
        assert_eq!(body.matches("href=\"/buy/").count(), 1);
    }

    #[tokio::test]
    async fn purchase_page_shows_product_name_and_price() {
        let (store, app) = in_memory_app();
        let tablet = add(&store, "Планшет", 25_000, 2).await;

        let (status, _, body) = send(app, get(&format!("/buy/{}", tablet.id))).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Планшет"));
        assert!(body.contains("Цена: 25000 руб."));
        assert!(body.contains("name=\"person\""));
        assert!(body.contains("name=\"address\""));
    }

    #[tokio::test]
    async fn purchase_page_for_unknown_product_is_not_found() {
        let (_store, app) = in_memory_app();
        let (status, _, _) = send(app, get("/buy/404")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_numeric_product_ids_are_not_found() {
        let (store, app) = in_memory_app();
        add(&store, "Планшет", 25_000, 2).await;

        for uri in ["/buy/abc", "/buy/-1", "/buy/1.0", "/buy/99999999999999999999"] {
            let (status, _, _) = send(app.clone(), get(uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "GET {uri}");
        }

        let (status, _, _) = send(app, post_form("/buy/abc", "person=A&address=B")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn successful_purchase_redirects_and_decrements_stock() {
        let pool = connect(&DatabaseConfig::in_memory()).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let products = SqlProductRepository::new(pool.clone());
        let purchases = SqlPurchaseRepository::new(pool.clone());
        let tablet = products
            .insert(NewProduct::new("Планшет", 25_000).with_quantity(2))
            .await
            .expect("insert");
        let app = router(ShopState::from_pool(pool.clone()).expect("templates compile"));

        let (status, location, _) = send(
            app.clone(),
            post_form(
                &format!("/buy/{}", tablet.id),
                "person=%D0%A1%D0%B5%D1%80%D0%B3%D0%B5%D0%B9&address=Moskva%2C+Tverskaya",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(location.as_deref(), Some("/"));

        let (status, _, _) = send(app, get("/")).await;
        assert_eq!(status, StatusCode::OK);

        let stored = products.find_by_id(tablet.id).await.expect("find").expect("exists");
        assert_eq!(stored.quantity, 1);

        let purchase = purchases.latest().await.expect("latest").expect("purchase stored");
        assert_eq!(purchase.person, "Сергей");
        assert_eq!(purchase.address, "Moskva, Tverskaya");
        assert_eq!(purchase.product_id, tablet.id);

        pool.close().await;
    }

    #[tokio::test]
    async fn sold_out_product_is_refused_with_bad_request() {
        let (store, app) = in_memory_app();
        let case = add(&store, "Чехол", 1_500, 0).await;

        let (status, _, body) =
            send(app, post_form(&format!("/buy/{}", case.id), "person=Someone&address=Somewhere"))
                .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.to_lowercase().contains("нет в наличии"));
        assert!(store.list_for_product(case.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn purchase_after_stock_is_exhausted_is_refused() {
        let (store, app) = in_memory_app();
        let tablet = add(&store, "Планшет", 25_000, 2).await;
        for name in ["First", "Second"] {
            store.create(NewPurchase::new(tablet.id, name, "Far")).await.expect("purchase");
        }

        let (status, _, body) =
            send(app, post_form(&format!("/buy/{}", tablet.id), "person=Late&address=Far")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.to_lowercase().contains("товара нет в наличии"));
        assert_eq!(store.list_for_product(tablet.id).await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn blank_fields_rerender_the_form_without_buying() {
        let (store, app) = in_memory_app();
        let tablet = add(&store, "Планшет", 25_000, 2).await;

        let (status, _, body) =
            send(app, post_form(&format!("/buy/{}", tablet.id), "person=&address=Far")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("This field is required."));
        assert!(body.contains("value=\"Far\""));
        let stored = ProductRepository::find_by_id(store.as_ref(), tablet.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(stored.quantity, 2);
    }

    #[tokio::test]
    async fn blank_fields_on_a_sold_out_product_rerender_the_form() {
        let (store, app) = in_memory_app();
        let case = add(&store, "Чехол", 1_500, 0).await;

        let (status, _, body) =
            send(app, post_form(&format!("/buy/{}", case.id), "person=&address=")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.matches("This field is required.").count(), 2);
        assert!(store.list_for_product(case.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn unavailable_storage_is_service_unavailable_without_details() {
        let pool = connect(&DatabaseConfig::in_memory()).await.expect("connect");
        let app = router(ShopState::from_pool(pool.clone()).expect("templates compile"));
        pool.close().await;

        let (status, _, body) = send(app.clone(), get("/")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.contains("sqlite"));
        assert!(!body.contains("closed"));

        let (status, _, _) = send(app, post_form("/buy/1", "person=A&address=B")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    /// Catalog view that still reports stock the order intake no longer has,
    /// as when another buyer commits between the pre-check and the purchase.
    struct StaleCatalog {
        snapshot: Product,
        inner: Arc<InMemoryStorefront>,
    }

    #[async_trait::async_trait]
    impl ProductRepository for StaleCatalog {
        async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
            Ok(vec![self.snapshot.clone()])
        }

        async fn find_by_id(&self, _id: ProductId) -> Result<Option<Product>, RepositoryError> {
            Ok(Some(self.snapshot.clone()))
        }

        async fn insert(&self, product: NewProduct) -> Result<Product, RepositoryError> {
            self.inner.insert(product).await
        }

        async fn save(&self, product: Product) -> Result<(), RepositoryError> {
            self.inner.save(product).await
        }

        async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
            self.inner.delete(id).await
        }

        async fn buy(&self, id: ProductId, count: u32) -> Result<Product, RepositoryError> {
            self.inner.buy(id, count).await
        }
    }

    #[tokio::test]
    async fn losing_the_stock_race_at_commit_is_a_bad_request() {
        let store = Arc::new(InMemoryStorefront::default());
        let last = add(&store, "Наушники", 5_000, 1).await;
        store.create(NewPurchase::new(last.id, "Winner", "Near")).await.expect("winner buys");

        let catalog = Arc::new(StaleCatalog { snapshot: last.clone(), inner: store.clone() });
        let app = router(ShopState::new(catalog, store.clone()).expect("templates compile"));

        let (status, _, body) =
            send(app, post_form(&format!("/buy/{}", last.id), "person=Loser&address=Far")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.to_lowercase().contains("товара недостаточно"));
        assert_eq!(store.list_for_product(last.id).await.expect("list").len(), 1);
    }
}
