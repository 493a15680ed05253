//! Catalog route handlers.

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use electomart_core::domain::PageRequest;
use electomart_core::{ProductCategory, ProductId, ProductImageId};
use serde::Serialize;
use tracing::instrument;

use crate::db::{ProductRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::product::{
    CreateProduct, Product, ProductImage, ProductPage, ProductQuery, UpdateProduct,
};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

/// Multipart field carrying product images.
const IMAGE_FIELD: &str = "images";

/// Most images accepted in one upload request.
const MAX_IMAGES_PER_UPLOAD: usize = 5;

/// Browsers may cache catalog reads briefly.
const CATALOG_CACHE_CONTROL: &str = "public, max-age=30";

/// `GET /api/products`
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<impl IntoResponse> {
    if let (Some(min), Some(max)) = (query.min_price, query.max_price)
        && min > max
    {
        return Err(AppError::Validation(
            "minPrice must not exceed maxPrice".to_string(),
        ));
    }

    let page = PageRequest::new(query.page, query.limit);
    let (products, total) = ProductRepository::new(state.pool())
        .list(&query, page)
        .await?;

    Ok((
        [(header::CACHE_CONTROL, CATALOG_CACHE_CONTROL)],
        Json(ProductPage {
            products,
            page: page.page(),
            pages: page.pages(total),
            total,
        }),
    ))
}

/// Category value and display label.
#[derive(Debug, Serialize)]
pub struct CategoryView {
    pub value: ProductCategory,
    pub label: &'static str,
}

/// `GET /api/products/categories`
pub async fn categories() -> impl IntoResponse {
    let categories: Vec<CategoryView> = ProductCategory::ALL
        .iter()
        .map(|&value| CategoryView {
            value,
            label: value.label(),
        })
        .collect();
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(categories),
    )
}

/// `GET /api/products/{id}`
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<impl IntoResponse> {
    let product = load_product(&state, id).await?;
    Ok((
        [(header::CACHE_CONTROL, CATALOG_CACHE_CONTROL)],
        Json(product),
    ))
}

/// Product detail through the cache.
pub(crate) async fn load_product(state: &AppState, id: ProductId) -> Result<Product> {
    if let Some(product) = state.product_cache().get(&id).await {
        return Ok(product);
    }

    let product = ProductRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    state.product_cache().insert(id, product.clone()).await;
    Ok(product)
}

/// `POST /api/products` (admin)
#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.sub))]
pub async fn create(
    State(state): State<AppState>,
    admin: RequireAdmin,
    ApiJson(body): ApiJson<CreateProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = body.validate()?;
    let product = ProductRepository::new(state.pool()).create(&product).await?;

    tracing::info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// `PUT /api/products/{id}` (admin)
#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.sub))]
pub async fn update(
    State(state): State<AppState>,
    admin: RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<UpdateProduct>,
) -> Result<Json<Product>> {
    let product = ProductRepository::new(state.pool()).update(id, body).await?;
    state.invalidate_product(id).await;

    tracing::info!("Product updated");
    Ok(Json(product))
}

/// Result of a delete.
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub message: &'static str,
}

/// `DELETE /api/products/{id}` (admin)
///
/// CDN images are removed after the row is gone; failures there only leave
/// orphaned files, so they are logged rather than surfaced.
#[instrument(skip(state, admin), fields(admin_id = %admin.0.sub))]
pub async fn destroy(
    State(state): State<AppState>,
    admin: RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<Deleted>> {
    let images = ProductRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(not_found("Product not found"))?;
    state.invalidate_product(id).await;

    if let Ok(media) = state.media() {
        for image in images.iter().map(|i| i.public_id.as_str()).filter(|p| !p.is_empty()) {
            if let Err(e) = media.destroy(image).await {
                tracing::warn!(public_id = image, error = %e, "Failed to delete product image from CDN");
            }
        }
    }

    tracing::info!("Product deleted");
    Ok(Json(Deleted {
        message: "Product deleted",
    }))
}

/// `POST /api/products/{id}/images` (admin, multipart)
#[instrument(skip(state, admin, multipart), fields(admin_id = %admin.0.sub))]
pub async fn upload_images(
    State(state): State<AppState>,
    admin: RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Vec<ProductImage>>)> {
    let mut multipart = multipart?;
    let media = state.media()?;
    let repo = ProductRepository::new(state.pool());
    if repo.get_row(id).await?.is_none() {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_owned)
            .filter(|ct| ct.starts_with("image/"))
            .ok_or_else(|| AppError::Upload("Only image files are accepted".to_string()))?;
        let file_name = field.file_name().unwrap_or("upload").to_owned();
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(AppError::Upload(format!("{file_name} is empty")));
        }
        files.push((file_name, content_type, bytes));
        if files.len() > MAX_IMAGES_PER_UPLOAD {
            return Err(AppError::Upload(format!(
                "At most {MAX_IMAGES_PER_UPLOAD} images per upload"
            )));
        }
    }
    if files.is_empty() {
        return Err(AppError::Upload(format!(
            "No files in the `{IMAGE_FIELD}` field"
        )));
    }

    let mut uploads = Vec::with_capacity(files.len());
    for (file_name, content_type, bytes) in files {
        let uploaded = media
            .upload(&file_name, &content_type, bytes.to_vec())
            .await?;
        uploads.push((uploaded.secure_url, uploaded.public_id));
    }

    let images = repo.add_images(id, &uploads).await?;
    state.invalidate_product(id).await;

    tracing::info!(count = images.len(), "Product images uploaded");
    Ok((StatusCode::CREATED, Json(images)))
}

/// `DELETE /api/products/{id}/images/{imageId}` (admin)
#[instrument(skip(state, admin), fields(admin_id = %admin.0.sub))]
pub async fn delete_image(
    State(state): State<AppState>,
    admin: RequireAdmin,
    ApiPath((id, image_id)): ApiPath<(ProductId, ProductImageId)>,
) -> Result<Json<Deleted>> {
    let image = ProductRepository::new(state.pool())
        .remove_image(id, image_id)
        .await
        .map_err(not_found("Image not found"))?;
    state.invalidate_product(id).await;

    if let Ok(media) = state.media()
        && !image.public_id.is_empty()
        && let Err(e) = media.destroy(&image.public_id).await
    {
        tracing::warn!(public_id = %image.public_id, error = %e, "Failed to delete product image from CDN");
    }

    Ok(Json(Deleted {
        message: "Image deleted",
    }))
}

/// Map `RepositoryError::NotFound` to a 404 with a specific message.
pub(crate) fn not_found(message: &'static str) -> impl Fn(RepositoryError) -> AppError {
    move |err| match err {
        RepositoryError::NotFound => AppError::NotFound(message.to_string()),
        other => AppError::Database(other),
    }
}
