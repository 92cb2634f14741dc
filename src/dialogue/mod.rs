//! Dialogue engine
//!
//! An explicit state machine over [`Step`]. Every call takes the stored
//! session plus one inbound event and returns a [`Turn`] describing what to
//! persist and what to send. Nothing here performs I/O, so the whole wizard
//! is testable without a transport.
//!
//! ENTER → INSTRUMENT → SYMBOL → TRADE TYPE → CURRENCY → BALANCE → RISK
//!       → STOP LOSS → PRICE → LEVERAGE → COMPLETE

pub mod prompts;

use crate::calculator::{LotSizeCalculator, TradeInputs};
use crate::models::{
    ConversationState, InboundEvent, InstrumentType, OutboundMessage, Session, Step, TradeType,
};
use prompts::{CALCULATE_AGAIN, END_CALCULATION, OFFERED_CURRENCIES, OTHER_CURRENCY};
use tracing::{debug, info, warn};

/// Slash commands understood in every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Calculate,
}

impl Command {
    /// Parse `/start`, `/help` and `/calculate`, tolerating a `@BotName`
    /// suffix and trailing arguments.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);

        match name {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "calculate" => Some(Command::Calculate),
            _ => None,
        }
    }
}

/// Outcome of handling one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// Session to persist; `None` clears the conversation.
    pub session: Option<Session>,
    /// Messages to send immediately, in order.
    pub replies: Vec<OutboundMessage>,
    /// Message to send after the follow-up delay.
    pub follow_up: Option<OutboundMessage>,
}

impl Turn {
    fn reply(session: Option<Session>, message: OutboundMessage) -> Self {
        Self {
            session,
            replies: vec![message],
            follow_up: None,
        }
    }

    fn advance(mut session: Session, next: Step, message: OutboundMessage) -> Self {
        session.step = next;
        Self::reply(Some(session), message)
    }

    fn reject(session: Session, message: OutboundMessage) -> Self {
        debug!(step = ?session.step, "Input rejected, re-prompting");
        Self::reply(Some(session), message)
    }
}

/// Drives the lot-size wizard for a single conversation at a time.
#[derive(Debug, Clone, Default)]
pub struct DialogueEngine {
    calculator: LotSizeCalculator,
}

impl DialogueEngine {
    pub fn new(calculator: LotSizeCalculator) -> Self {
        Self { calculator }
    }

    /// Start (or restart) the wizard with a fresh state.
    pub fn enter() -> Turn {
        Turn::reply(Some(Session::start()), prompts::ask_instrument())
    }

    /// Handle one inbound event against the stored session.
    pub fn handle(&self, session: Option<Session>, event: &InboundEvent) -> Turn {
        if let InboundEvent::Text(text) = event {
            if let Some(command) = Command::parse(text) {
                return self.command(command, session);
            }
        }

        match session {
            Some(session) if session.step.is_active() => self.advance(session, event),
            idle => self.idle(idle, event),
        }
    }

    fn command(&self, command: Command, session: Option<Session>) -> Turn {
        debug!(?command, "Handling command");
        match command {
            Command::Start => Turn::reply(session, prompts::welcome()),
            Command::Help => Turn::reply(session, prompts::help()),
            Command::Calculate => Self::enter(),
        }
    }

    /// No wizard step is active: only the restart/end actions mean anything.
    fn idle(&self, session: Option<Session>, event: &InboundEvent) -> Turn {
        match event {
            InboundEvent::Selection(tag) if tag == CALCULATE_AGAIN => Self::enter(),
            InboundEvent::Selection(tag) if tag == END_CALCULATION => {
                Turn::reply(None, prompts::farewell())
            }
            _ => Turn::reply(session, prompts::unknown_command()),
        }
    }

    fn advance(&self, mut session: Session, event: &InboundEvent) -> Turn {
        match session.step {
            Step::InstrumentType => match selection(event).and_then(InstrumentType::from_tag) {
                Some(instrument) => {
                    session.state.instrument_type = Some(instrument);
                    Turn::advance(session, Step::Symbol, prompts::ask_symbol())
                }
                None => Turn::reject(session, prompts::invalid_instrument()),
            },

            Step::Symbol => match free_text(event) {
                Some(symbol) => {
                    session.state.symbol = Some(symbol);
                    Turn::advance(session, Step::TradeType, prompts::ask_trade_type())
                }
                None => Turn::reject(session, prompts::invalid_symbol()),
            },

            Step::TradeType => match selection(event).and_then(TradeType::from_tag) {
                Some(trade_type) => {
                    session.state.trade_type = Some(trade_type);
                    Turn::advance(session, Step::AccountCurrency, prompts::ask_currency())
                }
                None => Turn::reject(session, prompts::invalid_trade_type()),
            },

            Step::AccountCurrency => self.currency(session, event),

            Step::AccountBalance => match positive(event) {
                Some(balance) => {
                    session.state.account_balance = Some(balance);
                    Turn::advance(session, Step::RiskPercentage, prompts::ask_risk())
                }
                None => Turn::reject(session, prompts::invalid_balance()),
            },

            Step::RiskPercentage => match percentage(event) {
                Some(risk) => {
                    session.state.risk_percentage = Some(risk);
                    Turn::advance(session, Step::StopLoss, prompts::ask_stop_loss())
                }
                None => Turn::reject(session, prompts::invalid_risk()),
            },

            Step::StopLoss => match positive(event) {
                Some(stop_loss) => {
                    session.state.stop_loss = Some(stop_loss);
                    Turn::advance(session, Step::CurrentPrice, prompts::ask_price())
                }
                None => Turn::reject(session, prompts::invalid_stop_loss()),
            },

            Step::CurrentPrice => match positive(event) {
                Some(price) => {
                    session.state.current_price = Some(price);
                    Turn::advance(session, Step::Leverage, prompts::ask_leverage())
                }
                None => Turn::reject(session, prompts::invalid_price()),
            },

            Step::Leverage => match positive(event) {
                Some(leverage) => {
                    session.state.leverage = Some(leverage);
                    self.finish(session.state)
                }
                None => Turn::reject(session, prompts::invalid_leverage()),
            },

            Step::Complete => self.idle(Some(session), event),
        }
    }

    /// Account currency: a fixed option advances, "Other" waits for free text.
    fn currency(&self, mut session: Session, event: &InboundEvent) -> Turn {
        match event {
            InboundEvent::Selection(tag) if tag == OTHER_CURRENCY => {
                session.state.awaiting_custom_currency = true;
                Turn::reply(Some(session), prompts::ask_custom_currency())
            }
            InboundEvent::Selection(tag) if OFFERED_CURRENCIES.contains(&tag.as_str()) => {
                let prompt = prompts::ask_balance(tag);
                session.state.account_currency = Some(tag.clone());
                session.state.awaiting_custom_currency = false;
                Turn::advance(session, Step::AccountBalance, prompt)
            }
            InboundEvent::Text(_) if session.state.awaiting_custom_currency => {
                match free_text(event) {
                    Some(currency) => {
                        let prompt = prompts::ask_balance(&currency);
                        session.state.account_currency = Some(currency);
                        session.state.awaiting_custom_currency = false;
                        Turn::advance(session, Step::AccountBalance, prompt)
                    }
                    None => Turn::reject(session, prompts::invalid_currency()),
                }
            }
            _ => Turn::reject(session, prompts::invalid_currency()),
        }
    }

    /// All answers collected: compute and hand back result + restart prompt.
    fn finish(&self, state: ConversationState) -> Turn {
        match TradeInputs::from_state(&state) {
            Ok(inputs) => {
                let result = self.calculator.compute(&inputs);
                info!(
                    instrument = %inputs.instrument_type,
                    symbol = %inputs.symbol,
                    lot_size = %result.lot_size,
                    risk_amount = %result.risk_amount,
                    "Lot size calculated"
                );

                Turn {
                    session: Some(Session::complete()),
                    replies: vec![prompts::result_message(&state, &result)],
                    follow_up: Some(prompts::restart_or_end()),
                }
            }
            Err(error) => {
                // Only reachable with a corrupted persisted session.
                warn!(%error, "Incomplete answers at final step, restarting wizard");
                Turn {
                    session: Some(Session::start()),
                    replies: vec![
                        OutboundMessage::text(
                            "Some of your answers were lost. Let's start the calculation again.",
                        ),
                        prompts::ask_instrument(),
                    ],
                    follow_up: None,
                }
            }
        }
    }
}

// =============================
// Input parsing
// =============================

fn selection(event: &InboundEvent) -> Option<&str> {
    match event {
        InboundEvent::Selection(tag) => Some(tag.as_str()),
        _ => None,
    }
}

/// Trimmed, upper-cased, non-blank free text.
fn free_text(event: &InboundEvent) -> Option<String> {
    match event {
        InboundEvent::Text(text) if !text.trim().is_empty() => Some(text.trim().to_uppercase()),
        _ => None,
    }
}

fn number(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn positive(event: &InboundEvent) -> Option<f64> {
    match event {
        InboundEvent::Text(text) => number(text).filter(|value| *value > 0.0),
        _ => None,
    }
}

/// A number in (0, 100], optionally written with a trailing `%`.
fn percentage(event: &InboundEvent) -> Option<f64> {
    let InboundEvent::Text(text) = event else {
        return None;
    };
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed);

    number(trimmed).filter(|value| *value > 0.0 && *value <= 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TextFormat;

    fn text(value: &str) -> InboundEvent {
        InboundEvent::Text(value.to_string())
    }

    fn pick(value: &str) -> InboundEvent {
        InboundEvent::Selection(value.to_string())
    }

    /// Feed events in order, returning the final session and the last turn.
    fn run(engine: &DialogueEngine, events: &[InboundEvent]) -> (Option<Session>, Turn) {
        let mut session = None;
        let mut last = None;
        for event in events {
            let turn = engine.handle(session.take(), event);
            session = turn.session.clone();
            last = Some(turn);
        }
        (session, last.expect("at least one event"))
    }

    fn forex_answers() -> Vec<InboundEvent> {
        vec![
            text("/calculate"),
            pick("Forex"),
            text("eurusd"),
            pick("Major"),
            pick("USD"),
            text("10000"),
            text("1"),
            text("50"),
            text("1.1"),
            text("1"),
        ]
    }

    /// Session parked at `step` after answering everything before it.
    fn session_at(engine: &DialogueEngine, step: Step) -> Session {
        let answers = forex_answers();
        let count = step.index() as usize;
        let (session, _) = run(engine, &answers[..count]);
        let session = session.unwrap();
        assert_eq!(session.step, step);
        session
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/help@LotSizeBot"), Some(Command::Help));
        assert_eq!(Command::parse("  /calculate now"), Some(Command::Calculate));
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("calculate"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_calculate_enters_wizard() {
        let engine = DialogueEngine::default();
        let turn = engine.handle(None, &text("/calculate"));

        assert_eq!(turn.session, Some(Session::start()));
        assert_eq!(turn.replies, vec![prompts::ask_instrument()]);
        assert_eq!(turn.replies[0].options.len(), 5);
        assert!(turn.follow_up.is_none());
    }

    #[test]
    fn test_full_forex_flow() {
        let engine = DialogueEngine::default();
        let (session, turn) = run(&engine, &forex_answers());

        assert_eq!(session, Some(Session::complete()));
        assert_eq!(turn.replies.len(), 1);

        let result = &turn.replies[0];
        assert_eq!(result.format, TextFormat::Markdown);
        assert!(result.text.contains("*Instrument:* Forex (EURUSD)"));
        assert!(result.text.contains("*Recommended Lot Size:* 0.20"));
        assert!(result.text.contains("*Risk Amount:* 100.00 USD"));
        assert_eq!(turn.follow_up, Some(prompts::restart_or_end()));
    }

    #[test]
    fn test_each_valid_answer_adds_one_field_and_one_step() {
        let engine = DialogueEngine::default();
        let answers = forex_answers();
        let mut session = engine.handle(None, &answers[0]).session;

        for event in &answers[1..answers.len() - 1] {
            let before = session.clone().unwrap();
            let turn = engine.handle(session.take(), event);
            let after = turn.session.clone().unwrap();

            assert_eq!(after.step.index(), before.step.index() + 1);
            assert_eq!(
                after.state.populated_fields(),
                before.state.populated_fields() + 1
            );
            session = turn.session;
        }
    }

    #[test]
    fn test_invalid_numbers_leave_session_unchanged() {
        let engine = DialogueEngine::default();
        let cases = [
            (Step::AccountBalance, prompts::invalid_balance()),
            (Step::RiskPercentage, prompts::invalid_risk()),
            (Step::StopLoss, prompts::invalid_stop_loss()),
            (Step::CurrentPrice, prompts::invalid_price()),
            (Step::Leverage, prompts::invalid_leverage()),
        ];

        for (step, reprompt) in cases {
            let parked = session_at(&engine, step);
            for bad in ["abc", "-5", "0", "inf", "NaN", "", "12abc"] {
                let turn = engine.handle(Some(parked.clone()), &text(bad));
                assert_eq!(turn.session.as_ref(), Some(&parked), "{:?} / {:?}", step, bad);
                assert_eq!(turn.replies, vec![reprompt.clone()]);
            }

            let turn = engine.handle(Some(parked.clone()), &pick("USD"));
            assert_eq!(turn.session.as_ref(), Some(&parked));
        }
    }

    #[test]
    fn test_repeated_invalid_input_is_idempotent() {
        let engine = DialogueEngine::default();
        let mut session = Some(session_at(&engine, Step::StopLoss));
        let parked = session.clone();

        for _ in 0..5 {
            let turn = engine.handle(session.take(), &text("wide"));
            assert_eq!(turn.replies, vec![prompts::invalid_stop_loss()]);
            session = turn.session;
        }
        assert_eq!(session, parked);
    }

    #[test]
    fn test_risk_percentage_bounds() {
        let engine = DialogueEngine::default();
        let parked = session_at(&engine, Step::RiskPercentage);

        let turn = engine.handle(Some(parked.clone()), &text("100"));
        assert_eq!(turn.session.unwrap().state.risk_percentage, Some(100.0));

        let turn = engine.handle(Some(parked.clone()), &text(" 2.5% "));
        assert_eq!(turn.session.unwrap().state.risk_percentage, Some(2.5));

        let turn = engine.handle(Some(parked.clone()), &text("100.01"));
        assert_eq!(turn.session, Some(parked));
    }

    #[test]
    fn test_choice_steps_reject_text_and_unknown_tags() {
        let engine = DialogueEngine::default();

        let parked = session_at(&engine, Step::InstrumentType);
        let turn = engine.handle(Some(parked.clone()), &text("Forex"));
        assert_eq!(turn.session.as_ref(), Some(&parked));
        assert_eq!(turn.replies, vec![prompts::invalid_instrument()]);

        let turn = engine.handle(Some(parked.clone()), &pick("Options"));
        assert_eq!(turn.session, Some(parked));

        let parked = session_at(&engine, Step::TradeType);
        let turn = engine.handle(Some(parked.clone()), &text("Major"));
        assert_eq!(turn.session, Some(parked));
        assert_eq!(turn.replies, vec![prompts::invalid_trade_type()]);
    }

    #[test]
    fn test_symbol_is_trimmed_and_uppercased() {
        let engine = DialogueEngine::default();
        let parked = session_at(&engine, Step::Symbol);

        let turn = engine.handle(Some(parked.clone()), &text("   "));
        assert_eq!(turn.replies, vec![prompts::invalid_symbol()]);

        let turn = engine.handle(Some(parked), &text("  btc/usd "));
        let session = turn.session.unwrap();
        assert_eq!(session.state.symbol.as_deref(), Some("BTC/USD"));
        assert_eq!(session.step, Step::TradeType);
    }

    #[test]
    fn test_other_currency_waits_for_free_text() {
        let engine = DialogueEngine::default();
        let parked = session_at(&engine, Step::AccountCurrency);

        // Free text before choosing "Other" is not accepted.
        let turn = engine.handle(Some(parked.clone()), &text("chf"));
        assert_eq!(turn.session.as_ref(), Some(&parked));
        assert_eq!(turn.replies, vec![prompts::invalid_currency()]);

        let turn = engine.handle(Some(parked), &pick("Other"));
        let waiting = turn.session.unwrap();
        assert_eq!(waiting.step, Step::AccountCurrency);
        assert!(waiting.state.awaiting_custom_currency);
        assert!(waiting.state.account_currency.is_none());
        assert_eq!(turn.replies, vec![prompts::ask_custom_currency()]);

        let turn = engine.handle(Some(waiting), &text("chf"));
        let session = turn.session.unwrap();
        assert_eq!(session.step, Step::AccountBalance);
        assert_eq!(session.state.account_currency.as_deref(), Some("CHF"));
        assert!(!session.state.awaiting_custom_currency);
        assert_eq!(turn.replies, vec![prompts::ask_balance("CHF")]);
    }

    #[test]
    fn test_unsupported_event_is_invalid_input() {
        let engine = DialogueEngine::default();
        let parked = session_at(&engine, Step::Symbol);

        let turn = engine.handle(Some(parked.clone()), &InboundEvent::Unsupported);
        assert_eq!(turn.session, Some(parked));
        assert_eq!(turn.replies, vec![prompts::invalid_symbol()]);
    }

    #[test]
    fn test_calculate_again_resets_state() {
        let engine = DialogueEngine::default();
        let (session, _) = run(&engine, &forex_answers());

        let turn = engine.handle(session, &pick(CALCULATE_AGAIN));
        assert_eq!(turn.session, Some(Session::start()));
        assert_eq!(turn.session.unwrap().state.populated_fields(), 0);
        assert_eq!(turn.replies, vec![prompts::ask_instrument()]);
    }

    #[test]
    fn test_calculate_command_discards_progress() {
        let engine = DialogueEngine::default();
        let parked = session_at(&engine, Step::StopLoss);

        let turn = engine.handle(Some(parked), &text("/calculate"));
        assert_eq!(turn.session, Some(Session::start()));
    }

    #[test]
    fn test_restart_tags_during_wizard_are_ordinary_input() {
        let engine = DialogueEngine::default();
        let parked = session_at(&engine, Step::AccountBalance);

        let turn = engine.handle(Some(parked.clone()), &pick(CALCULATE_AGAIN));
        assert_eq!(turn.session, Some(parked));
        assert_eq!(turn.replies, vec![prompts::invalid_balance()]);
    }

    #[test]
    fn test_end_calculation_clears_session() {
        let engine = DialogueEngine::default();
        let (session, _) = run(&engine, &forex_answers());

        let turn = engine.handle(session, &pick(END_CALCULATION));
        assert!(turn.session.is_none());
        assert_eq!(turn.replies, vec![prompts::farewell()]);
    }

    #[test]
    fn test_start_and_help_keep_progress() {
        let engine = DialogueEngine::default();
        let parked = session_at(&engine, Step::CurrentPrice);

        let turn = engine.handle(Some(parked.clone()), &text("/help"));
        assert_eq!(turn.session.as_ref(), Some(&parked));
        assert_eq!(turn.replies, vec![prompts::help()]);

        let turn = engine.handle(Some(parked.clone()), &text("/start"));
        assert_eq!(turn.session, Some(parked));
        assert_eq!(turn.replies, vec![prompts::welcome()]);
    }

    #[test]
    fn test_text_outside_wizard_is_unknown_command() {
        let engine = DialogueEngine::default();

        let turn = engine.handle(None, &text("hello"));
        assert!(turn.session.is_none());
        assert_eq!(turn.replies, vec![prompts::unknown_command()]);

        let turn = engine.handle(Some(Session::complete()), &text("50"));
        assert_eq!(turn.session, Some(Session::complete()));
        assert_eq!(turn.replies, vec![prompts::unknown_command()]);
    }

    #[test]
    fn test_corrupted_session_restarts_at_final_step() {
        let engine = DialogueEngine::default();
        let corrupted = Session {
            step: Step::Leverage,
            state: ConversationState::default(),
        };

        let turn = engine.handle(Some(corrupted), &text("1"));
        assert_eq!(turn.session, Some(Session::start()));
        assert_eq!(turn.replies.len(), 2);
        assert!(turn.follow_up.is_none());
    }
}
