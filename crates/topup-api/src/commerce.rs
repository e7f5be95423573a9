//! Transactions and payment channels.

use crate::{ApiClient, ApiRequest, ApiResponse};
use reqwest::Method;
use topup_types::{
    CreateTransactionRequest, FeeCalculation, FeeCalculationRequest, PaymentChannel,
    PaymentChannelGroup, Transaction, TransactionStatusView,
};

impl ApiClient {
    /// The signed-in user's transactions.
    pub async fn transactions(&self) -> ApiResponse<Vec<Transaction>> {
        self.send(ApiRequest::get("/transactions")).await
    }

    pub async fn transaction(&self, id: &str) -> ApiResponse<Transaction> {
        self.send(ApiRequest::get(format!("/transactions/{id}"))).await
    }

    pub async fn transaction_status(&self, id: &str) -> ApiResponse<TransactionStatusView> {
        self.send(ApiRequest::get(format!("/transactions/{id}/status")))
            .await
    }

    pub async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> ApiResponse<Transaction> {
        self.send_json(Method::POST, "/transactions", request).await
    }

    pub async fn payment_channels(&self) -> ApiResponse<Vec<PaymentChannel>> {
        self.send(ApiRequest::get("/payment/channels")).await
    }

    pub async fn payment_channels_by_type(&self, kind: &str) -> ApiResponse<Vec<PaymentChannel>> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("type", kind)
            .finish();
        self.send(ApiRequest::get(format!("/payment/channels/type?{query}")))
            .await
    }

    pub async fn grouped_payment_channels(&self) -> ApiResponse<Vec<PaymentChannelGroup>> {
        self.send(ApiRequest::get("/payment/channels/grouped")).await
    }

    pub async fn payment_channel(&self, code: &str) -> ApiResponse<PaymentChannel> {
        self.send(ApiRequest::get(format!("/payment/channels/{code}")))
            .await
    }

    /// Server-side fee quote for paying `amount` through channel `code`.
    pub async fn calculate_fee(&self, amount: f64, code: &str) -> ApiResponse<FeeCalculation> {
        let body = FeeCalculationRequest {
            amount,
            code: code.to_string(),
        };
        self.send_json(Method::POST, "/payment/calculate-fee", &body)
            .await
    }
}
