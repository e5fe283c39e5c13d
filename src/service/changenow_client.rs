//! ChangeNOW v2 Exchange API 客户端
//!
//! - 报价：GET  /v2/exchange/estimated-amount
//! - 下单：POST /v2/exchange
//! - 状态：GET  /v2/exchange/by-id

use std::str::FromStr;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::GatewayConfig;
use crate::domain::SwapStatus;
use crate::error::{AppError, AppResult};
use crate::service::exchange_gateway::{
    CreatedOrder, ExchangeGateway, NetworkMap, OrderRequest, OrderStatusReport, RateQuote,
    RateRequest,
};

const API_KEY_HEADER: &str = "x-changenow-api-key";

/// 服务商金额可能是 JSON 数字也可能是字符串，统一转成十进制字符串
fn decimal_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected decimal amount, got {}",
            other
        ))),
    }
}

fn optional_decimal_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected decimal amount, got {}",
            other
        ))),
    }
}

/// 报价响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimatedAmountResponse {
    #[serde(deserialize_with = "decimal_string")]
    from_amount: String,
    #[serde(deserialize_with = "decimal_string", alias = "estimatedAmount")]
    to_amount: String,
    #[serde(default, deserialize_with = "optional_decimal_string")]
    deposit_fee: Option<String>,
    #[serde(
        default,
        deserialize_with = "optional_decimal_string",
        alias = "networkFee"
    )]
    withdrawal_fee: Option<String>,
}

/// 下单请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateExchangeBody<'a> {
    from_currency: &'a str,
    to_currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_network: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_network: Option<&'a str>,
    from_amount: &'a str,
    address: &'a str,
    refund_address: &'a str,
    flow: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// 下单响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExchangeResponse {
    id: String,
    payin_address: String,
    #[serde(
        default,
        deserialize_with = "optional_decimal_string",
        alias = "amount"
    )]
    to_amount: Option<String>,
}

/// 订单状态响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeStatusResponse {
    status: String,
    #[serde(default)]
    payin_hash: Option<String>,
    #[serde(default)]
    payout_hash: Option<String>,
}

/// 服务商错误响应
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// ChangeNOW 客户端
pub struct ChangeNowClient {
    client: Client,
    base_url: String,
    api_key: String,
    networks: NetworkMap,
}

impl ChangeNowClient {
    pub fn new(config: &GatewayConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            networks: NetworkMap::from_config(&config.network_map)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(API_KEY_HEADER, &self.api_key)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, op: &str) -> AppResult<T> {
        let response = self.authorized(request).send().await.map_err(|e| {
            tracing::warn!(operation = op, error = %e, "exchange gateway request failed");
            AppError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("unreadable error body: {}", e));
            return Err(error_from_status(op, status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::gateway(format!("{}: failed to parse response: {}", op, e)))
    }
}

fn error_from_status(op: &str, status: StatusCode, body: &str) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return AppError::gateway(format!("{}: rate limited", op));
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.message.or(e.error))
        .unwrap_or_else(|| body.chars().take(200).collect());
    AppError::gateway(format!("{}: HTTP {}: {}", op, status.as_u16(), detail))
}

fn ticker(currency: &str) -> String {
    currency.trim().to_lowercase()
}

/// rate = 目标数量 / 源数量
fn compute_rate(from_amount: &str, to_amount: &str) -> AppResult<String> {
    let from = Decimal::from_str(from_amount)
        .map_err(|_| AppError::gateway(format!("invalid fromAmount: {}", from_amount)))?;
    let to = Decimal::from_str(to_amount)
        .map_err(|_| AppError::gateway(format!("invalid toAmount: {}", to_amount)))?;
    if from.is_zero() {
        return Err(AppError::gateway("fromAmount is zero"));
    }
    let rate = to
        .checked_div(from)
        .ok_or_else(|| AppError::gateway("exchange rate overflows decimal range"))?;
    Ok(rate.normalize().to_string())
}

#[async_trait]
impl ExchangeGateway for ChangeNowClient {
    async fn get_rate(&self, request: &RateRequest) -> AppResult<RateQuote> {
        let from = ticker(&request.from_currency);
        let to = ticker(&request.to_currency);

        let mut query: Vec<(&str, &str)> = vec![
            ("fromCurrency", from.as_str()),
            ("toCurrency", to.as_str()),
            ("fromAmount", request.amount.as_str()),
            ("flow", "standard"),
            ("type", "direct"),
        ];
        if let Some(network) = self.networks.network_for(request.from_evm_chain_id) {
            query.push(("fromNetwork", network));
        }
        if let Some(network) = self.networks.network_for(request.to_evm_chain_id) {
            query.push(("toNetwork", network));
        }

        let data: EstimatedAmountResponse = self
            .send(
                self.client
                    .get(self.url("/v2/exchange/estimated-amount"))
                    .query(&query),
                "get_rate",
            )
            .await?;

        Ok(RateQuote {
            rate: compute_rate(&data.from_amount, &data.to_amount)?,
            estimated_amount: data.to_amount,
            fee: data.deposit_fee.unwrap_or_else(|| "0".into()),
            network_fee: data.withdrawal_fee.unwrap_or_else(|| "0".into()),
        })
    }

    async fn create_order(&self, request: &OrderRequest) -> AppResult<CreatedOrder> {
        let from = ticker(&request.pair.from_currency);
        let to = ticker(&request.pair.to_currency);

        let body = CreateExchangeBody {
            from_currency: &from,
            to_currency: &to,
            from_network: self.networks.network_for(request.pair.from_evm_chain_id),
            to_network: self.networks.network_for(request.pair.to_evm_chain_id),
            from_amount: &request.pair.amount,
            address: &request.destination_address,
            refund_address: &request.refund_address,
            flow: "standard",
            kind: "direct",
        };

        let data: CreateExchangeResponse = self
            .send(
                self.client.post(self.url("/v2/exchange")).json(&body),
                "create_order",
            )
            .await?;

        Ok(CreatedOrder {
            external_id: data.id,
            deposit_address: data.payin_address,
            expected_amount_out: data.to_amount.unwrap_or_else(|| "0".into()),
        })
    }

    async fn get_order_status(&self, external_id: &str) -> AppResult<OrderStatusReport> {
        let data: ExchangeStatusResponse = self
            .send(
                self.client
                    .get(self.url("/v2/exchange/by-id"))
                    .query(&[("id", external_id)]),
                "get_order_status",
            )
            .await?;

        Ok(OrderStatusReport {
            fine_status: data.status.parse::<SwapStatus>()?,
            payin_hash: data.payin_hash,
            payout_hash: data.payout_hash,
        })
    }
}
