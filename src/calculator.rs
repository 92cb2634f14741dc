//! Lot-size calculator
//!
//! Pure, deterministic position sizing. The risk amount is always
//! `balance * risk% / 100`; the pip value and reported precision depend on
//! the instrument family. No I/O happens here.

use crate::error::BotError;
use crate::models::{CalculationResult, ConversationState, InstrumentType, TradeType};
use crate::Result;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

const FOREX_PIP_SIZE: f64 = 0.0001;
const JPY_PIP_SIZE: f64 = 0.01;
const CRYPTO_PIP_FRACTION: f64 = 0.01;
const METALS_PIP_PER_OUNCE: f64 = 0.1;
const SYNTHETIC_PIP_VALUE: f64 = 0.1;

const STANDARD_DECIMALS: usize = 2;
const CRYPTO_DECIMALS: usize = 4;

pub const UNKNOWN_INSTRUMENT_EXPLANATION: &str =
    "Could not calculate lot size due to unknown instrument type.";

pub const DEGENERATE_INPUT_EXPLANATION: &str =
    "Could not calculate lot size: the stop loss, price and leverage combination produces an undefined position size.";

/// Market constants that vary by broker and contract.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatorConfig {
    /// Units of base currency in one standard Forex lot
    pub standard_lot_units: f64,
    /// Coins per crypto contract
    pub crypto_contract_size: f64,
    /// Troy ounces in one metals lot
    pub ounces_per_lot: f64,
    /// Account-currency value of one index point per contract
    pub index_point_value: f64,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            standard_lot_units: 100_000.0,
            crypto_contract_size: 1.0,
            ounces_per_lot: 100.0,
            index_point_value: 1.0,
        }
    }
}

/// A fully collected set of answers.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeInputs {
    pub instrument_type: InstrumentType,
    pub symbol: String,
    pub trade_type: TradeType,
    pub account_currency: String,
    pub account_balance: f64,
    pub risk_percentage: f64,
    pub stop_loss: f64,
    pub current_price: f64,
    pub leverage: f64,
}

impl TradeInputs {
    /// Extract the inputs from a conversation, failing on the first missing field.
    pub fn from_state(state: &ConversationState) -> Result<Self> {
        Ok(Self {
            instrument_type: state
                .instrument_type
                .clone()
                .ok_or(BotError::IncompleteState("instrument_type"))?,
            symbol: state
                .symbol
                .clone()
                .ok_or(BotError::IncompleteState("symbol"))?,
            trade_type: state
                .trade_type
                .ok_or(BotError::IncompleteState("trade_type"))?,
            account_currency: state
                .account_currency
                .clone()
                .ok_or(BotError::IncompleteState("account_currency"))?,
            account_balance: state
                .account_balance
                .ok_or(BotError::IncompleteState("account_balance"))?,
            risk_percentage: state
                .risk_percentage
                .ok_or(BotError::IncompleteState("risk_percentage"))?,
            stop_loss: state
                .stop_loss
                .ok_or(BotError::IncompleteState("stop_loss"))?,
            current_price: state
                .current_price
                .ok_or(BotError::IncompleteState("current_price"))?,
            leverage: state
                .leverage
                .ok_or(BotError::IncompleteState("leverage"))?,
        })
    }
}

/// Instrument-aware lot-size calculator.
#[derive(Debug, Clone, Default)]
pub struct LotSizeCalculator {
    config: CalculatorConfig,
}

impl LotSizeCalculator {
    pub fn new(config: CalculatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    /// Compute the recommended position for a completed set of answers.
    ///
    /// Unknown instruments and degenerate inputs are not errors: they yield a
    /// zero lot size with an explanatory message, and the risk amount is
    /// still reported.
    pub fn compute(&self, inputs: &TradeInputs) -> CalculationResult {
        let risk_amount = inputs.account_balance * inputs.risk_percentage / 100.0;

        if !risk_amount.is_finite() {
            let decimals = match inputs.instrument_type {
                InstrumentType::Crypto => CRYPTO_DECIMALS,
                _ => STANDARD_DECIMALS,
            };
            let (lot_size, explanation) = degenerate(decimals);
            return CalculationResult {
                lot_size,
                risk_amount: fixed(0.0, STANDARD_DECIMALS),
                explanation,
            };
        }

        let (lot_size, explanation) = match &inputs.instrument_type {
            InstrumentType::Forex => self.forex(inputs, risk_amount),
            InstrumentType::Crypto => self.crypto(inputs, risk_amount),
            InstrumentType::Metals => self.metals(inputs, risk_amount),
            InstrumentType::Indices => self.indices(inputs, risk_amount),
            InstrumentType::Synthetic => self.synthetic(inputs, risk_amount),
            InstrumentType::Unrecognized(raw) => {
                debug!(instrument = %raw, "Unknown instrument type reached calculator");
                (
                    fixed(0.0, STANDARD_DECIMALS),
                    UNKNOWN_INSTRUMENT_EXPLANATION.to_string(),
                )
            }
        };

        CalculationResult {
            lot_size,
            risk_amount: fixed(risk_amount, STANDARD_DECIMALS),
            explanation,
        }
    }

    /// Standard lots. Pip value per lot is quoted in the account currency
    /// when the pair ends with it, otherwise converted through the price.
    fn forex(&self, i: &TradeInputs, risk_amount: f64) -> (String, String) {
        let pip_size = if i.symbol.contains("JPY") {
            JPY_PIP_SIZE
        } else {
            FOREX_PIP_SIZE
        };
        let per_lot = pip_size * self.config.standard_lot_units;

        let pip_value = if i.symbol.ends_with(i.account_currency.as_str()) {
            per_lot
        } else {
            per_lot / i.current_price
        };

        let Some(lot) = position_size(risk_amount, i.stop_loss * pip_value, i.leverage) else {
            return degenerate(STANDARD_DECIMALS);
        };
        let lot_size = fixed(lot, STANDARD_DECIMALS);

        let explanation = format!(
            "Based on your account balance of {} {} and risk tolerance of {}%, \
             you can risk {} {} on this trade. With a stop loss of {} pips and leverage of {}x, \
             the optimal lot size is {} standard lots.",
            i.account_balance,
            i.account_currency,
            i.risk_percentage,
            fixed(risk_amount, STANDARD_DECIMALS),
            i.account_currency,
            i.stop_loss,
            i.leverage,
            lot_size
        );

        (lot_size, explanation)
    }

    /// Coins of the base asset, reported to 4 decimals.
    fn crypto(&self, i: &TradeInputs, risk_amount: f64) -> (String, String) {
        let pip_value =
            i.stop_loss * CRYPTO_PIP_FRACTION * i.current_price * self.config.crypto_contract_size;

        let Some(lot) = position_size(risk_amount, pip_value, i.leverage) else {
            return degenerate(CRYPTO_DECIMALS);
        };
        let lot_size = fixed(lot, CRYPTO_DECIMALS);

        let base_asset = i
            .symbol
            .split_once('/')
            .map(|(base, _)| base)
            .unwrap_or(&i.symbol);

        let explanation = format!(
            "For crypto trading, with your risk amount of {} {} and a stop loss of {} points \
             at the current price of {}, the recommended position size is {} {}.",
            fixed(risk_amount, STANDARD_DECIMALS),
            i.account_currency,
            i.stop_loss,
            i.current_price,
            lot_size,
            base_asset
        );

        (lot_size, explanation)
    }

    fn metals(&self, i: &TradeInputs, risk_amount: f64) -> (String, String) {
        let ounces_per_lot = self.config.ounces_per_lot;
        let pip_value = i.stop_loss * METALS_PIP_PER_OUNCE * ounces_per_lot;

        let Some(lot) = position_size(risk_amount, pip_value, i.leverage) else {
            return degenerate(STANDARD_DECIMALS);
        };
        let lot_size = fixed(lot, STANDARD_DECIMALS);

        let explanation = format!(
            "For metals trading, with your risk amount of {} {} and a stop loss of {} points, \
             the recommended lot size is {} lots ({} ounces).",
            fixed(risk_amount, STANDARD_DECIMALS),
            i.account_currency,
            i.stop_loss,
            lot_size,
            lot * ounces_per_lot
        );

        (lot_size, explanation)
    }

    fn indices(&self, i: &TradeInputs, risk_amount: f64) -> (String, String) {
        let pip_value = i.stop_loss * self.config.index_point_value;

        let Some(lot) = position_size(risk_amount, pip_value, i.leverage) else {
            return degenerate(STANDARD_DECIMALS);
        };
        let lot_size = fixed(lot, STANDARD_DECIMALS);

        let explanation = format!(
            "For indices trading, with your risk amount of {} {} and a stop loss of {} points, \
             the recommended contract size is {} contracts.",
            fixed(risk_amount, STANDARD_DECIMALS),
            i.account_currency,
            i.stop_loss,
            lot_size
        );

        (lot_size, explanation)
    }

    fn synthetic(&self, i: &TradeInputs, risk_amount: f64) -> (String, String) {
        let pip_value = i.stop_loss * SYNTHETIC_PIP_VALUE;

        let Some(lot) = position_size(risk_amount, pip_value, i.leverage) else {
            return degenerate(STANDARD_DECIMALS);
        };
        let lot_size = fixed(lot, STANDARD_DECIMALS);

        let explanation = format!(
            "For synthetic instrument trading, with your risk amount of {} {} and a stop loss of {} points, \
             the recommended position size is {} units.",
            fixed(risk_amount, STANDARD_DECIMALS),
            i.account_currency,
            i.stop_loss,
            lot_size
        );

        (lot_size, explanation)
    }
}

/// `risk / pip_value * leverage`, or `None` when the formula degenerates.
fn position_size(risk_amount: f64, pip_value: f64, leverage: f64) -> Option<f64> {
    if !pip_value.is_finite() || pip_value <= 0.0 {
        return None;
    }

    let lot = risk_amount / pip_value * leverage;
    lot.is_finite().then_some(lot)
}

fn degenerate(decimals: usize) -> (String, String) {
    (fixed(0.0, decimals), DEGENERATE_INPUT_EXPLANATION.to_string())
}

/// Fixed-point text with exact halves rounded away from zero.
///
/// The binary value is converted without rounding first, so `0.125` lands
/// on `0.13` while `1.005` (stored just below the half) stays `1.00`.
fn fixed(value: f64, decimals: usize) -> String {
    match Decimal::from_f64_retain(value) {
        Some(exact) => {
            let rounded =
                exact.round_dp_with_strategy(decimals as u32, RoundingStrategy::MidpointAwayFromZero);
            format!("{:.*}", decimals, rounded)
        }
        // Outside Decimal's range every finite f64 is a whole number
        None => format!("{:.*}", decimals, value),
    }
}
