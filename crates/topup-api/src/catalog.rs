//! Game and product catalogue.

use crate::{ApiClient, ApiRequest, ApiResponse};
use topup_types::{Category, Game, Product};

impl ApiClient {
    pub async fn games(&self) -> ApiResponse<Vec<Game>> {
        self.send(ApiRequest::get("/games")).await
    }

    pub async fn categories(&self) -> ApiResponse<Vec<Category>> {
        self.send(ApiRequest::get("/categories")).await
    }

    pub async fn popular_games(&self) -> ApiResponse<Vec<Game>> {
        self.send(ApiRequest::get("/games/popular")).await
    }

    pub async fn games_by_category(&self, category: &str) -> ApiResponse<Vec<Game>> {
        self.send(ApiRequest::get(format!("/games/category/{category}")))
            .await
    }

    pub async fn game_by_code(&self, code: &str) -> ApiResponse<Game> {
        self.send(ApiRequest::get(format!("/games/{code}"))).await
    }

    pub async fn products_by_game(&self, game_id: &str) -> ApiResponse<Vec<Product>> {
        self.send(ApiRequest::get(format!("/products/game/{game_id}")))
            .await
    }

    /// Only products currently on sale.
    pub async fn active_products_by_game(&self, game_id: &str) -> ApiResponse<Vec<Product>> {
        self.send(ApiRequest::get(format!("/products/game/{game_id}/active")))
            .await
    }

    pub async fn product_by_sku(&self, sku: &str) -> ApiResponse<Product> {
        self.send(ApiRequest::get(format!("/products/sku/{sku}"))).await
    }

    pub async fn product(&self, id: &str) -> ApiResponse<Product> {
        self.send(ApiRequest::get(format!("/products/{id}"))).await
    }
}

#[cfg(test)]
mod tests {
    use crate::ApiClient;
    use std::sync::Arc;
    use topup_storage::{MemoryStorage, TokenStore};

    fn client(url: String) -> ApiClient {
        ApiClient::new(url, Arc::new(TokenStore::new(Arc::new(MemoryStorage::new()))))
    }

    #[tokio::test]
    async fn test_games_with_pagination_meta() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/games")
            .with_status(200)
            .with_body(
                r#"{"success":true,
                "data":[{"id":"g1","code":"mlbb","name":"Mobile Legends"}],
                "meta":{"current_page":1,"per_page":20,"total_items":1,"total_pages":1}}"#,
            )
            .create_async()
            .await;

        let response = client(server.url()).games().await;
        assert!(response.success);
        assert_eq!(response.data.unwrap()[0].code, "mlbb");
        assert_eq!(response.meta.unwrap().per_page, 20);
    }

    #[tokio::test]
    async fn test_active_products_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/products/game/g1/active")
            .with_status(200)
            .with_body(r#"{"success":true,"data":[]}"#)
            .create_async()
            .await;

        let response = client(server.url()).active_products_by_game("g1").await;
        assert_eq!(response.data, Some(vec![]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_game_surfaces_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/games/nope")
            .with_status(404)
            .with_body(r#"{"success":false,"message":"Game not found","code":"NOT_FOUND"}"#)
            .create_async()
            .await;

        let response = client(server.url()).game_by_code("nope").await;
        assert!(!response.success);
        assert_eq!(response.code.as_deref(), Some("NOT_FOUND"));
    }
}
