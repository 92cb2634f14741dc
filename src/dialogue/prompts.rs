//! User-facing texts and option layouts

use crate::models::{
    CalculationResult, ConversationState, InstrumentType, OutboundMessage, ReplyOption, TradeType,
};

pub const CALCULATE_AGAIN: &str = "calculate_again";
pub const END_CALCULATION: &str = "end_calculation";
pub const OTHER_CURRENCY: &str = "Other";

/// Currencies offered as buttons, laid out two per row.
pub const OFFERED_CURRENCIES: [&str; 4] = ["USD", "EUR", "GBP", "JPY"];

// =============================
// Commands
// =============================

pub fn welcome() -> OutboundMessage {
    OutboundMessage::text(
        "Welcome to the Trading Lot Size Calculator Bot! 📊\n\n\
         I can help you calculate the optimal lot size for your trades based on proper risk management.\n\n\
         Use /calculate to start a new calculation.",
    )
}

pub fn help() -> OutboundMessage {
    OutboundMessage::text(
        "This bot calculates the optimal lot size for your trades based on risk management principles.\n\n\
         Commands:\n\
         /start - Start the bot\n\
         /help - Show this help message\n\
         /calculate - Start a new lot size calculation",
    )
}

pub fn unknown_command() -> OutboundMessage {
    OutboundMessage::text("I don't understand that command. Use /help to see available commands.")
}

pub fn farewell() -> OutboundMessage {
    OutboundMessage::text(
        "Thank you for using the Trading Lot Size Calculator! \
         Type /calculate whenever you need to calculate a new lot size.",
    )
}

pub fn restart_or_end() -> OutboundMessage {
    OutboundMessage::text("Would you like to calculate another lot size?").with_options(vec![
        vec![ReplyOption::new("Yes, calculate again", CALCULATE_AGAIN)],
        vec![ReplyOption::new("No, thank you", END_CALCULATION)],
    ])
}

// =============================
// Wizard prompts
// =============================

fn instrument_options() -> Vec<Vec<ReplyOption>> {
    InstrumentType::offered()
        .iter()
        .map(|instrument| vec![ReplyOption::same(instrument.as_str())])
        .collect()
}

fn trade_type_options() -> Vec<Vec<ReplyOption>> {
    TradeType::offered()
        .iter()
        .map(|trade_type| vec![ReplyOption::same(trade_type.as_str())])
        .collect()
}

fn currency_options() -> Vec<Vec<ReplyOption>> {
    let mut rows: Vec<Vec<ReplyOption>> = OFFERED_CURRENCIES
        .chunks(2)
        .map(|pair| pair.iter().map(|code| ReplyOption::same(code)).collect())
        .collect();
    rows.push(vec![ReplyOption::same(OTHER_CURRENCY)]);
    rows
}

pub fn ask_instrument() -> OutboundMessage {
    OutboundMessage::text("What type of trading instrument are you using?")
        .with_options(instrument_options())
}

pub fn ask_symbol() -> OutboundMessage {
    OutboundMessage::text(
        "Please enter the currency pair or asset symbol (e.g., EUR/USD, BTC/USD, GOLD, NASDAQ):",
    )
}

pub fn ask_trade_type() -> OutboundMessage {
    OutboundMessage::text("What is the trade type?").with_options(trade_type_options())
}

pub fn ask_currency() -> OutboundMessage {
    OutboundMessage::text("What is your account currency?").with_options(currency_options())
}

pub fn ask_custom_currency() -> OutboundMessage {
    OutboundMessage::text("Please specify your account currency:")
}

pub fn ask_balance(currency: &str) -> OutboundMessage {
    OutboundMessage::text(format!("What is your account balance in {}?", currency))
}

pub fn ask_risk() -> OutboundMessage {
    OutboundMessage::text(
        "What percentage of your account are you willing to risk per trade? (e.g., 1 for 1%)",
    )
}

pub fn ask_stop_loss() -> OutboundMessage {
    OutboundMessage::text("What is your stop loss distance in pips or points?")
}

pub fn ask_price() -> OutboundMessage {
    OutboundMessage::text("What is the current price of the asset?")
}

pub fn ask_leverage() -> OutboundMessage {
    OutboundMessage::text("What is your leverage? (enter 1 if you are not using leverage)")
}

// =============================
// Re-prompts
// =============================

pub fn invalid_instrument() -> OutboundMessage {
    OutboundMessage::text("Please select an instrument type from the options.")
        .with_options(instrument_options())
}

pub fn invalid_symbol() -> OutboundMessage {
    OutboundMessage::text("Please enter a valid symbol.")
}

pub fn invalid_trade_type() -> OutboundMessage {
    OutboundMessage::text("Please select a trade type from the options.")
        .with_options(trade_type_options())
}

pub fn invalid_currency() -> OutboundMessage {
    OutboundMessage::text("Please select or enter your account currency.")
        .with_options(currency_options())
}

pub fn invalid_balance() -> OutboundMessage {
    OutboundMessage::text("Please enter a valid account balance (must be a positive number).")
}

pub fn invalid_risk() -> OutboundMessage {
    OutboundMessage::text("Please enter a valid risk percentage (between 0 and 100).")
}

pub fn invalid_stop_loss() -> OutboundMessage {
    OutboundMessage::text("Please enter a valid stop loss distance (must be a positive number).")
}

pub fn invalid_price() -> OutboundMessage {
    OutboundMessage::text("Please enter a valid current price (must be a positive number).")
}

pub fn invalid_leverage() -> OutboundMessage {
    OutboundMessage::text("Please enter a valid leverage (must be a positive number).")
}

// =============================
// Result
// =============================

/// Markdown summary of the collected answers and the calculation.
///
/// Symbol, currency and explanation carry user text and are escaped.
pub fn result_message(state: &ConversationState, result: &CalculationResult) -> OutboundMessage {
    let currency = escape_markdown(state.account_currency.as_deref().unwrap_or_default());

    let mut text = String::from("📊 *Lot Size Calculation Results* 📊\n\n");
    text.push_str(&format!(
        "*Instrument:* {} ({})\n",
        display(&state.instrument_type),
        escape_markdown(state.symbol.as_deref().unwrap_or_default())
    ));
    text.push_str(&format!("*Trade Type:* {}\n", display(&state.trade_type)));
    text.push_str(&format!(
        "*Account:* {} {}\n",
        display(&state.account_balance),
        currency
    ));
    text.push_str(&format!("*Risk:* {}%\n", display(&state.risk_percentage)));
    text.push_str(&format!("*Stop Loss:* {} pips\n", display(&state.stop_loss)));
    text.push_str(&format!("*Current Price:* {}\n", display(&state.current_price)));
    text.push_str(&format!("*Leverage:* {}x\n\n", display(&state.leverage)));
    text.push_str(&format!("*Recommended Lot Size:* {}\n\n", result.lot_size));
    text.push_str(&format!("*Risk Amount:* {} {}\n", result.risk_amount, currency));
    text.push_str(&format!(
        "*Explanation:* {}",
        escape_markdown(&result.explanation)
    ));

    OutboundMessage::text(text).markdown()
}

fn display<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// Backslash-escape the entity markers of Telegram's legacy Markdown.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
