//! Broker REST API client (bearer-token authenticated)

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info};

use super::BrokerApi;
use crate::types::{AccountBalance, BrokerOrderStatus, Position, PriceBar, Quote};

/// The broker returns at most this many daily rows per request
const MAX_BARS_PER_REQUEST: usize = 100;

/// Authenticated broker client
#[derive(Clone)]
pub struct BrokerClient {
    client: Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    code: String,
    price: String,
    change_rate: String,
    volume: i64,
}

#[derive(Debug, Deserialize)]
struct RawBar {
    date: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: i64,
    change_rate: String,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    code: String,
    quantity: i64,
    avg_price: String,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    cash: String,
    positions: Vec<RawPosition>,
}

#[derive(Debug, Deserialize)]
struct RawOrderStatus {
    order_no: String,
    status: String,
    filled_price: Option<String>,
}

impl BrokerClient {
    pub fn new(base_url: String, access_token: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url,
            access_token,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Broker API error {}: {}", status, body);
        }

        Ok(response.json().await?)
    }

    /// One page of daily bars starting at `start_date`
    async fn get_daily_page(
        &self,
        stock_code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let url = format!(
            "{}/v1/daily?code={}&start={}&end={}&limit={}",
            self.base_url, stock_code, start_date, end_date, MAX_BARS_PER_REQUEST
        );

        debug!(stock_code, %start_date, %end_date, "Fetching daily bars");

        let raw: Vec<RawBar> = self.get_json(&url).await?;

        let bars: Vec<PriceBar> = raw
            .into_iter()
            .filter_map(|raw| {
                Some(PriceBar {
                    stock_code: stock_code.to_string(),
                    trade_date: raw.date.parse().ok()?,
                    open: Decimal::from_str(&raw.open).ok()?,
                    high: Decimal::from_str(&raw.high).ok()?,
                    low: Decimal::from_str(&raw.low).ok()?,
                    close: Decimal::from_str(&raw.close).ok()?,
                    volume: raw.volume,
                    change_rate: Decimal::from_str(&raw.change_rate).ok()?,
                })
            })
            .collect();

        debug!(count = bars.len(), "Fetched daily bars");
        Ok(bars)
    }
}

#[async_trait]
impl BrokerApi for BrokerClient {
    async fn get_price(&self, stock_code: &str) -> Result<Quote> {
        let url = format!("{}/v1/quote?code={}", self.base_url, stock_code);
        let raw: RawQuote = self.get_json(&url).await?;

        Ok(Quote {
            stock_code: raw.code,
            price: Decimal::from_str(&raw.price)?,
            change_rate: Decimal::from_str(&raw.change_rate)?,
            volume: raw.volume,
        })
    }

    /// Fetch daily bars with automatic pagination for ranges > 100 rows
    async fn get_daily_bars(
        &self,
        stock_code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let mut all_bars = Vec::new();
        let mut current_start = start_date;

        info!(stock_code, %start_date, %end_date, "Fetching paginated daily bars");

        while current_start <= end_date {
            let bars = self
                .get_daily_page(stock_code, current_start, end_date)
                .await?;

            if bars.is_empty() {
                break;
            }

            let page_len = bars.len();
            let last_date = bars.last().map(|b| b.trade_date).unwrap_or(end_date);
            all_bars.extend(bars);

            if page_len < MAX_BARS_PER_REQUEST {
                break;
            }

            // Move start to the day after the last returned row
            current_start = last_date + chrono::Days::new(1);

            // Small delay to respect rate limits
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        info!(total = all_bars.len(), "Paginated bar fetch complete");
        Ok(all_bars)
    }

    async fn get_balance(&self) -> Result<AccountBalance> {
        let url = format!("{}/v1/balance", self.base_url);
        let raw: RawBalance = self.get_json(&url).await?;

        let positions = raw
            .positions
            .into_iter()
            .map(|p| {
                Ok(Position {
                    stock_code: p.code,
                    quantity: p.quantity,
                    avg_price: Decimal::from_str(&p.avg_price)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AccountBalance {
            cash: Decimal::from_str(&raw.cash)?,
            positions,
        })
    }

    async fn get_order_status(&self, order_no: &str) -> Result<BrokerOrderStatus> {
        let url = format!("{}/v1/orders/{}", self.base_url, order_no);
        let raw: RawOrderStatus = self.get_json(&url).await?;

        let filled_price = raw
            .filled_price
            .as_deref()
            .map(Decimal::from_str)
            .transpose()?;

        Ok(BrokerOrderStatus {
            order_no: raw.order_no,
            status: raw.status,
            filled_price,
        })
    }
}
