//! Uploads and back-office endpoints.
//!
//! Game and product writes take a [`MultipartForm`] because they may carry
//! image files.

use crate::{ApiClient, ApiRequest, ApiResponse, MultipartForm};
use reqwest::Method;
use serde_json::Value;
use topup_types::{
    AdminStats, Game, PaymentChannel, PaymentChannelUpdate, Product, Transaction,
    TransactionStatus, TransactionStatusUpdate, UploadedImage,
};

const DEFAULT_UPLOAD_FOLDER: &str = "images";

impl ApiClient {
    /// Upload an image into `folder` (default `images`).
    pub async fn upload_image(
        &self,
        file_name: &str,
        mime: Option<&str>,
        bytes: Vec<u8>,
        folder: Option<&str>,
    ) -> ApiResponse<UploadedImage> {
        let form = MultipartForm::new()
            .file("file", file_name, mime, bytes)
            .text("folder", folder.unwrap_or(DEFAULT_UPLOAD_FOLDER));
        self.send(ApiRequest::post("/upload/image").with_multipart(form))
            .await
    }

    pub async fn admin_stats(&self) -> ApiResponse<AdminStats> {
        self.send(ApiRequest::get("/admin/stats")).await
    }

    pub async fn create_game(&self, form: MultipartForm) -> ApiResponse<Game> {
        self.send(ApiRequest::post("/admin/games").with_multipart(form))
            .await
    }

    pub async fn update_game(&self, id: &str, form: MultipartForm) -> ApiResponse<Game> {
        self.send(ApiRequest::put(format!("/admin/games/{id}")).with_multipart(form))
            .await
    }

    pub async fn delete_game(&self, id: &str) -> ApiResponse<Value> {
        self.send(ApiRequest::delete(format!("/admin/games/{id}")))
            .await
    }

    /// Every product, including inactive ones.
    pub async fn all_products(&self) -> ApiResponse<Vec<Product>> {
        self.send(ApiRequest::get("/admin/products")).await
    }

    pub async fn create_product(&self, form: MultipartForm) -> ApiResponse<Product> {
        self.send(ApiRequest::post("/admin/products").with_multipart(form))
            .await
    }

    pub async fn update_product(&self, id: &str, form: MultipartForm) -> ApiResponse<Product> {
        self.send(ApiRequest::put(format!("/admin/products/{id}")).with_multipart(form))
            .await
    }

    pub async fn delete_product(&self, id: &str) -> ApiResponse<Value> {
        self.send(ApiRequest::delete(format!("/admin/products/{id}")))
            .await
    }

    /// Every user's transactions.
    pub async fn all_transactions(&self) -> ApiResponse<Vec<Transaction>> {
        self.send(ApiRequest::get("/admin/transactions")).await
    }

    pub async fn update_transaction_status(
        &self,
        id: &str,
        status: TransactionStatus,
    ) -> ApiResponse<Transaction> {
        self.send_json(
            Method::PUT,
            &format!("/admin/transactions/{id}"),
            &TransactionStatusUpdate { status },
        )
        .await
    }

    pub async fn update_payment_channel(
        &self,
        code: &str,
        update: &PaymentChannelUpdate,
    ) -> ApiResponse<PaymentChannel> {
        self.send_json(Method::PUT, &format!("/admin/payment/channels/{code}"), update)
            .await
    }
}
