use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use teloxide::types::{ChatId, Message};
use tracing::{error, info, warn};

use crate::address::{looks_like_address, WalletAddress};
use crate::contract::BalanceSource;

pub const WELCOME: &str = "Welcome to the NFT Balance Checker Bot!\n\
     Send me a wallet address to check how many NFTs it holds from this collection.\n\n\
     Commands:\n\
     /check <wallet_address> - Check the NFT balance of a wallet";
pub const SEND_VALID_ADDRESS: &str = "Please send a valid wallet address.";
pub const CHECK_USAGE: &str = "Please provide a wallet address after the /check command.";
pub const INVALID_ADDRESS: &str = "Invalid wallet address.";
pub const GENERIC_ERROR: &str = "An error occurred while checking the balance.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Check(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Command(Command),
    Text(String),
}

/// A chat event reduced to what the handlers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub sender: Option<u64>,
    pub kind: EventKind,
}

/// What to send back, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: ChatId,
    pub text: String,
}

impl InboundEvent {
    /// Classify raw message text. Unknown slash commands fall through as
    /// plain text so the user still gets a hint. Returns `None` for a
    /// command addressed to a different bot (`/check@OtherBot`).
    pub fn parse(
        chat_id: ChatId,
        sender: Option<u64>,
        text: &str,
        username: Option<&str>,
    ) -> Option<Self> {
        let kind = match parse_command(text, username) {
            Parsed::Ours(command) => EventKind::Command(command),
            Parsed::OtherBot => return None,
            Parsed::NotACommand => EventKind::Text(text.to_string()),
        };
        Some(Self {
            chat_id,
            sender,
            kind,
        })
    }

    /// Returns `None` for messages without text (stickers, photos, ...).
    pub fn from_message(msg: &Message, username: Option<&str>) -> Option<Self> {
        let text = msg.text()?;
        let sender = msg.from.as_ref().map(|user| user.id.0);
        Self::parse(msg.chat.id, sender, text, username)
    }
}

enum Parsed {
    Ours(Command),
    OtherBot,
    NotACommand,
}

fn parse_command(text: &str, username: Option<&str>) -> Parsed {
    let mut parts = text.split_whitespace();
    let Some(head) = parts.next().and_then(|word| word.strip_prefix('/')) else {
        return Parsed::NotACommand;
    };

    // "/start@SomeBot" is how commands arrive in group chats.
    let (name, target) = match head.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (head, None),
    };

    let command = match name {
        "start" => Command::Start,
        "check" => Command::Check(parts.next().map(str::to_string)),
        _ => return Parsed::NotACommand,
    };

    match (target, username) {
        (Some(target), Some(me)) if !target.eq_ignore_ascii_case(me) => Parsed::OtherBot,
        _ => Parsed::Ours(command),
    }
}

/// Turn an event into a reply. Never fails: every error, including a panic
/// inside the lookup, becomes a user-facing message.
pub async fn handle_event(event: &InboundEvent, balances: &dyn BalanceSource) -> Reply {
    let text = match &event.kind {
        EventKind::Command(Command::Start) => WELCOME.to_string(),
        EventKind::Command(Command::Check(None)) => CHECK_USAGE.to_string(),
        EventKind::Command(Command::Check(Some(arg))) => guarded_lookup(arg, balances).await,
        EventKind::Text(text) => handle_text(text, balances).await,
    };

    Reply {
        chat_id: event.chat_id,
        text,
    }
}

async fn handle_text(text: &str, balances: &dyn BalanceSource) -> String {
    if !looks_like_address(text) {
        return SEND_VALID_ADDRESS.to_string();
    }
    guarded_lookup(text, balances).await
}

async fn guarded_lookup(raw: &str, balances: &dyn BalanceSource) -> String {
    match AssertUnwindSafe(lookup(raw, balances)).catch_unwind().await {
        Ok(text) => text,
        Err(_) => {
            error!("Balance lookup panicked for input {:?}", raw);
            GENERIC_ERROR.to_string()
        }
    }
}

async fn lookup(raw: &str, balances: &dyn BalanceSource) -> String {
    let address = match WalletAddress::parse(raw) {
        Ok(address) => address,
        Err(e) => {
            warn!("Rejected address {:?}: {}", raw, e);
            return INVALID_ADDRESS.to_string();
        }
    };

    match balances.balance_of(address).await {
        Ok(balance) => {
            info!("Balance of {}: {}", address, balance);
            format!("The wallet {address} holds {balance} NFTs from this collection.")
        }
        Err(e) => {
            error!("Error checking balance of {}: {}", address, e);
            GENERIC_ERROR.to_string()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use ethers::types::U256;

    use super::*;
    use crate::contract::BalanceError;

    const LOWER: &str = "0xde0b295669a9fd93d5f28d9ec85e40f4cb697bae";
    const CHECKSUMMED: &str = "0xde0B295669a9FD93d5F28D9Ec85E40f4cb697BAe";

    pub(crate) enum Behaviour {
        Balances(HashMap<String, u64>),
        RpcDown,
        Revert,
        Panic,
    }

    /// In-memory stand-in for the chain. Counts calls so tests can assert the
    /// contract was never touched.
    pub(crate) struct FakeBalances {
        behaviour: Behaviour,
        calls: AtomicUsize,
        pub(crate) last_owner: std::sync::Mutex<Option<String>>,
    }

    impl FakeBalances {
        pub(crate) fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: AtomicUsize::new(0),
                last_owner: std::sync::Mutex::new(None),
            }
        }

        pub(crate) fn with_balance(owner: &str, balance: u64) -> Self {
            let mut map = HashMap::new();
            map.insert(owner.to_string(), balance);
            Self::new(Behaviour::Balances(map))
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BalanceSource for FakeBalances {
        async fn balance_of(&self, owner: WalletAddress) -> Result<U256, BalanceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_owner.lock().unwrap() = Some(owner.to_string());
            match &self.behaviour {
                Behaviour::Balances(map) => {
                    Ok(U256::from(map.get(&owner.to_string()).copied().unwrap_or(0)))
                }
                Behaviour::RpcDown => Err(BalanceError::Rpc("connection refused".into())),
                Behaviour::Revert => Err(BalanceError::ContractCall("execution reverted".into())),
                Behaviour::Panic => panic!("node client blew up"),
            }
        }
    }

    const USERNAME: &str = "NftBalanceBot";

    fn text_event(text: &str) -> InboundEvent {
        InboundEvent::parse(ChatId(42), Some(7), text, Some(USERNAME)).unwrap()
    }

    #[test]
    fn test_parse_start() {
        assert_eq!(
            text_event("/start").kind,
            EventKind::Command(Command::Start)
        );
        assert_eq!(
            text_event("/start@NftBalanceBot").kind,
            EventKind::Command(Command::Start)
        );
    }

    #[test]
    fn test_parse_check_with_and_without_argument() {
        assert_eq!(
            text_event(&format!("/check {LOWER}")).kind,
            EventKind::Command(Command::Check(Some(LOWER.to_string())))
        );
        assert_eq!(
            text_event("/check").kind,
            EventKind::Command(Command::Check(None))
        );
    }

    #[test]
    fn test_command_for_another_bot_is_skipped() {
        let event = InboundEvent::parse(
            ChatId(42),
            Some(7),
            &format!("/check@OtherBot {LOWER}"),
            Some(USERNAME),
        );
        assert_eq!(event, None);

        let event =
            InboundEvent::parse(ChatId(42), Some(7), "/start@nftbalancebot", Some(USERNAME));
        assert_eq!(event.unwrap().kind, EventKind::Command(Command::Start));
    }

    #[test]
    fn test_suffix_accepted_when_username_unknown() {
        let event = InboundEvent::parse(ChatId(42), Some(7), "/start@AnyBot", None);
        assert_eq!(event.unwrap().kind, EventKind::Command(Command::Start));
    }

    #[test]
    fn test_unknown_command_is_text() {
        assert_eq!(
            text_event("/balance").kind,
            EventKind::Text("/balance".to_string())
        );
    }

    #[tokio::test]
    async fn test_start_replies_welcome() {
        let fake = FakeBalances::with_balance(CHECKSUMMED, 1);
        let reply = handle_event(&text_event("/start"), &fake).await;
        assert_eq!(reply.chat_id, ChatId(42));
        assert!(reply.text.contains("Welcome to the NFT Balance Checker Bot!"));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_address_text_never_hits_contract() {
        let fake = FakeBalances::with_balance(CHECKSUMMED, 1);
        let inputs = [
            "hello",
            "",
            "0x",
            "0xde0b295669a9fd93d5f28d9ec85e40f4cb697ba",
            "0xde0b295669a9fd93d5f28d9ec85e40f4cb697bae0",
            "de0b295669a9fd93d5f28d9ec85e40f4cb697bae00",
            " 0xde0b295669a9fd93d5f28d9ec85e40f4cb697bae",
        ];
        for input in inputs {
            let reply = handle_event(&text_event(input), &fake).await;
            assert_eq!(reply.text, SEND_VALID_ADDRESS, "input {:?}", input);
        }
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_address_shaped_but_invalid_text() {
        let fake = FakeBalances::with_balance(CHECKSUMMED, 1);
        let reply = handle_event(
            &text_event("0xzz0b295669a9fd93d5f28d9ec85e40f4cb697bae"),
            &fake,
        )
        .await;
        assert_eq!(reply.text, INVALID_ADDRESS);
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup_uses_checksummed_address() {
        let fake = FakeBalances::with_balance(CHECKSUMMED, 3);
        let reply = handle_event(&text_event(LOWER), &fake).await;
        assert_eq!(
            reply.text,
            format!("The wallet {CHECKSUMMED} holds 3 NFTs from this collection.")
        );
        assert_eq!(fake.last_owner.lock().unwrap().as_deref(), Some(CHECKSUMMED));
    }

    #[tokio::test]
    async fn test_repeated_lookups_agree() {
        let fake = FakeBalances::with_balance(CHECKSUMMED, 5);
        let first = handle_event(&text_event(LOWER), &fake).await;
        let second = handle_event(&text_event(LOWER), &fake).await;
        assert_eq!(first, second);
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn test_check_command() {
        let fake = FakeBalances::with_balance(CHECKSUMMED, 2);
        let reply = handle_event(&text_event(&format!("/check {LOWER}")), &fake).await;
        assert!(reply.text.contains("holds 2 NFTs"));

        let reply = handle_event(&text_event("/check"), &fake).await;
        assert_eq!(reply.text, CHECK_USAGE);

        let reply = handle_event(&text_event("/check nope"), &fake).await;
        assert_eq!(reply.text, INVALID_ADDRESS);
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_rpc_and_contract_failures_look_the_same() {
        let rpc = FakeBalances::new(Behaviour::RpcDown);
        let revert = FakeBalances::new(Behaviour::Revert);

        let a = handle_event(&text_event(LOWER), &rpc).await;
        let b = handle_event(&text_event(LOWER), &revert).await;
        assert_eq!(a.text, GENERIC_ERROR);
        assert_eq!(b.text, GENERIC_ERROR);
        assert!(!a.text.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_failure_does_not_poison_later_requests() {
        let fake = FakeBalances::new(Behaviour::RpcDown);
        handle_event(&text_event(LOWER), &fake).await;
        let reply = handle_event(&text_event("/start"), &fake).await;
        assert!(reply.text.starts_with("Welcome"));
    }

    #[tokio::test]
    async fn test_panicking_lookup_becomes_generic_error() {
        let fake = FakeBalances::new(Behaviour::Panic);
        let reply = handle_event(&text_event(LOWER), &fake).await;
        assert_eq!(reply.text, GENERIC_ERROR);

        let reply = handle_event(&text_event(LOWER), &fake).await;
        assert_eq!(reply.text, GENERIC_ERROR);
        assert_eq!(fake.calls(), 2);
    }
}
