//! Core data models for the lot-size bot

use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Enums =================
//

/// Instrument family selected at the first wizard step.
///
/// `Unrecognized` carries any value that did not come from the offered
/// options (for example a session persisted by an older build) so that it
/// still reaches the calculator's unknown-instrument branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstrumentType {
    Forex,
    Crypto,
    Metals,
    Indices,
    Synthetic,
    Unrecognized(String),
}

impl InstrumentType {
    /// The options offered by the wizard, in display order.
    pub fn offered() -> [InstrumentType; 5] {
        [
            InstrumentType::Forex,
            InstrumentType::Crypto,
            InstrumentType::Metals,
            InstrumentType::Indices,
            InstrumentType::Synthetic,
        ]
    }

    /// Parse a selection tag, accepting only the offered options.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match InstrumentType::from(tag.to_string()) {
            InstrumentType::Unrecognized(_) => None,
            known => Some(known),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstrumentType::Forex => "Forex",
            InstrumentType::Crypto => "Crypto",
            InstrumentType::Metals => "Metals",
            InstrumentType::Indices => "Indices",
            InstrumentType::Synthetic => "Synthetic",
            InstrumentType::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for InstrumentType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Forex" => InstrumentType::Forex,
            "Crypto" => InstrumentType::Crypto,
            "Metals" => InstrumentType::Metals,
            "Indices" => InstrumentType::Indices,
            "Synthetic" => InstrumentType::Synthetic,
            _ => InstrumentType::Unrecognized(value),
        }
    }
}

impl From<InstrumentType> for String {
    fn from(value: InstrumentType) -> Self {
        match value {
            InstrumentType::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeType {
    Major,
    Minor,
    Exotic,
}

impl TradeType {
    pub fn offered() -> [TradeType; 3] {
        [TradeType::Major, TradeType::Minor, TradeType::Exotic]
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Major" => Some(TradeType::Major),
            "Minor" => Some(TradeType::Minor),
            "Exotic" => Some(TradeType::Exotic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Major => "Major",
            TradeType::Minor => "Minor",
            TradeType::Exotic => "Exotic",
        }
    }
}

/// Wizard position. `Complete` is the terminal marker kept after a result
/// has been delivered so the restart buttons keep working.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    InstrumentType,
    Symbol,
    TradeType,
    AccountCurrency,
    AccountBalance,
    RiskPercentage,
    StopLoss,
    CurrentPrice,
    Leverage,
    Complete,
}

impl Step {
    /// Position in the wizard, 1..=9 for input steps and 10 for `Complete`.
    pub fn index(self) -> u8 {
        match self {
            Step::InstrumentType => 1,
            Step::Symbol => 2,
            Step::TradeType => 3,
            Step::AccountCurrency => 4,
            Step::AccountBalance => 5,
            Step::RiskPercentage => 6,
            Step::StopLoss => 7,
            Step::CurrentPrice => 8,
            Step::Leverage => 9,
            Step::Complete => 10,
        }
    }

    pub fn is_active(self) -> bool {
        self != Step::Complete
    }
}

//
// ================= Conversation =================
//

/// Opaque per-conversation key (a Telegram chat id rendered as text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl From<i64> for ConversationId {
    fn from(chat_id: i64) -> Self {
        ConversationId(chat_id.to_string())
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        ConversationId(value.to_string())
    }
}

/// Answers collected so far. Fields are filled strictly in wizard order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub instrument_type: Option<InstrumentType>,
    pub symbol: Option<String>,
    pub trade_type: Option<TradeType>,
    pub account_currency: Option<String>,
    pub account_balance: Option<f64>,
    pub risk_percentage: Option<f64>,
    pub stop_loss: Option<f64>,
    pub current_price: Option<f64>,
    pub leverage: Option<f64>,
    #[serde(default)]
    pub awaiting_custom_currency: bool,
}

impl ConversationState {
    /// Number of answers stored so far.
    pub fn populated_fields(&self) -> usize {
        [
            self.instrument_type.is_some(),
            self.symbol.is_some(),
            self.trade_type.is_some(),
            self.account_currency.is_some(),
            self.account_balance.is_some(),
            self.risk_percentage.is_some(),
            self.stop_loss.is_some(),
            self.current_price.is_some(),
            self.leverage.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// The record a session store persists for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub step: Step,
    pub state: ConversationState,
}

impl Session {
    /// A fresh wizard waiting for the instrument type.
    pub fn start() -> Self {
        Self {
            step: Step::InstrumentType,
            state: ConversationState::default(),
        }
    }

    /// Terminal marker; collected answers are discarded.
    pub fn complete() -> Self {
        Self {
            step: Step::Complete,
            state: ConversationState::default(),
        }
    }
}

//
// ================= Calculation =================
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub lot_size: String,
    pub risk_amount: String,
    pub explanation: String,
}

//
// ================= Transport I/O =================
//

/// An inbound user event, independent of the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Free text typed by the user.
    Text(String),
    /// A button press carrying the option's opaque tag.
    Selection(String),
    /// Anything without a usable payload (stickers, photos, empty callbacks).
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOption {
    pub label: String,
    pub tag: String,
}

impl ReplyOption {
    pub fn new(label: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tag: tag.into(),
        }
    }

    /// Option whose label doubles as its tag.
    pub fn same(value: &str) -> Self {
        Self::new(value, value)
    }
}

/// A message for the user, optionally with selectable options laid out in rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub options: Vec<Vec<ReplyOption>>,
    pub format: TextFormat,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: Vec::new(),
            format: TextFormat::Plain,
        }
    }

    pub fn with_options(mut self, options: Vec<Vec<ReplyOption>>) -> Self {
        self.options = options;
        self
    }

    pub fn markdown(mut self) -> Self {
        self.format = TextFormat::Markdown;
        self
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
