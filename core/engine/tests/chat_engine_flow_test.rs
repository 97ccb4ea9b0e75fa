use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use chat_engine::conversation::GREETING_REPLIES;
use chat_engine::seq2seq::DecoderStep;
use chat_engine::{
    ChatEngine, ChatEngineBuilder, ConversationState, EngineResult, InferencePolicy, LstmState,
    StepDecoder, TableSeq2Seq, TurnLogger, Vocabulary, APOLOGY_REPLY,
};

use ConversationState::*;

fn vocabulary() -> Arc<Vocabulary> {
    let words = [
        ("<start>", 1),
        ("<end>", 2),
        ("<unk>", 3),
        ("please", 4),
        ("send", 5),
        ("email", 6),
        ("thanks", 7),
    ];
    let map: HashMap<String, i64> = words.iter().map(|(w, id)| (w.to_string(), *id)).collect();
    Arc::new(Vocabulary::from_word_index(map).unwrap())
}

/// 模型回复 "please send email"
fn email_asking_model() -> TableSeq2Seq {
    TableSeq2Seq::new(8, 2)
        .with_transition(1, &[(4, 0.6), (7, 0.4)])
        .with_transition(4, &[(5, 1.0)])
        .with_transition(5, &[(6, 1.0)])
        .with_transition(6, &[(2, 1.0)])
        .with_transition(7, &[(2, 1.0)])
}

/// 模型回复 "thanks"
fn polite_model() -> TableSeq2Seq {
    TableSeq2Seq::new(8, 2)
        .with_transition(1, &[(7, 1.0)])
        .with_transition(7, &[(2, 1.0)])
}

fn engine_with(model: Arc<TableSeq2Seq>) -> ChatEngine {
    ChatEngineBuilder::new()
        .model(model)
        .vocabulary(vocabulary())
        .max_input_length(10)
        .max_response_length(10)
        .turn_logger(Arc::new(TurnLogger::new(false)))
        .build()
        .unwrap()
}

fn turn(engine: &ChatEngine, input: &str, state: ConversationState) -> (String, ConversationState) {
    let mut rng = StdRng::seed_from_u64(42);
    let reply = engine.respond_with_rng(input, state, &mut rng);
    (reply.reply, reply.state)
}

#[test]
fn greeting_resets_to_general() {
    let engine = engine_with(Arc::new(polite_model()));
    for state in ConversationState::all() {
        let (reply, next) = turn(&engine, "Hello there", *state);
        assert!(GREETING_REPLIES.contains(&reply.as_str()));
        assert_eq!(next, General);
    }
}

#[test]
fn goodbye_while_awaiting_email() {
    let engine = engine_with(Arc::new(polite_model()));
    let (reply, next) = turn(&engine, "goodbye", AwaitingEmail);
    assert_eq!(reply, "Thank you for chatting with me. Goodbye!");
    assert_eq!(next, General);
}

#[test]
fn email_capture_and_reprompt() {
    let engine = engine_with(Arc::new(polite_model()));

    let (reply, next) = turn(&engine, "it's jane@example.com", AwaitingEmail);
    assert_eq!(
        reply,
        "Thank you. I have your contact information now. How can I assist you further?"
    );
    assert_eq!(next, HasEmail);

    let (reply, next) = turn(&engine, "I don't have one", AwaitingEmail);
    assert_eq!(
        reply,
        "I'll need a valid email address to proceed. Could you please provide it?"
    );
    assert_eq!(next, AwaitingEmail);
}

#[test]
fn order_lookup_flow() {
    let engine = engine_with(Arc::new(polite_model()));

    let (reply, state) = turn(&engine, "I want to check my order", HasEmail);
    assert_eq!(
        reply,
        "I can help with that. Could you please provide your order number?"
    );
    assert_eq!(state, AwaitingOrderNumber);

    let (reply, state) = turn(&engine, "1234", state);
    assert!(reply.contains("at least 5 digits"));
    assert_eq!(state, AwaitingOrderNumber);

    let (reply, state) = turn(&engine, "123456", state);
    assert_eq!(
        reply,
        "Thank you. I've looked up order number 123456 and it is currently out for delivery."
    );
    assert_eq!(state, HasEmail);
}

#[test]
fn flight_cancellation_confirmed() {
    let engine = engine_with(Arc::new(polite_model()));

    let (reply, state) = turn(&engine, "I need to cancel my flight", HasEmail);
    assert!(reply.contains("Are you sure you want to cancel your flight?"));
    assert_eq!(state, AwaitingFlightInfo);

    let (reply, state) = turn(&engine, "yes", state);
    assert_eq!(state, HasEmail);
    let prefix = "Your flight has been successfully cancelled. Your confirmation number is ";
    assert!(reply.starts_with(prefix));
    let number: u32 = reply[prefix.len()..].trim_end_matches('.').parse().unwrap();
    assert!((10000..=99999).contains(&number));
}

#[test]
fn flight_cancellation_aborted() {
    let engine = engine_with(Arc::new(polite_model()));
    let (reply, state) = turn(&engine, "no, keep it", AwaitingFlightInfo);
    assert_eq!(
        reply,
        "Cancellation has been aborted. Is there anything else I can help with?"
    );
    assert_eq!(state, HasEmail);
}

#[test]
fn model_reply_asking_for_email_moves_to_awaiting_email() {
    let model = Arc::new(email_asking_model());
    let engine = engine_with(model.clone());

    let (reply, state) = turn(&engine, "my package never arrived", General);
    assert_eq!(reply, "please send email");
    assert_eq!(state, AwaitingEmail);
    assert_eq!(model.encode_calls(), 1);
}

#[test]
fn model_reply_keeps_state_outside_general() {
    let engine = engine_with(Arc::new(email_asking_model()));
    let (reply, state) = turn(&engine, "tell me more", HasEmail);
    assert_eq!(reply, "please send email");
    assert_eq!(state, HasEmail);
}

#[test]
fn model_reply_has_no_special_tokens() {
    let engine = engine_with(Arc::new(polite_model()));
    let (reply, state) = turn(&engine, "what can you do", General);
    assert_eq!(reply, "thanks");
    assert!(!reply.contains('<'));
    assert_eq!(state, General);
}

#[test]
fn model_failure_returns_apology_and_keeps_state() {
    let engine = engine_with(Arc::new(TableSeq2Seq::new(8, 2).failing()));
    for state in [General, HasEmail] {
        let (reply, next) = turn(&engine, "tell me something", state);
        assert_eq!(reply, APOLOGY_REPLY);
        assert_eq!(next, state);
    }
}

struct PanickingDecoder;

impl StepDecoder for PanickingDecoder {
    fn step(&self, _prev_token_id: i64, _state: &LstmState) -> EngineResult<DecoderStep> {
        panic!("decoder blew up");
    }
}

#[test]
fn model_panic_is_contained() {
    let engine = ChatEngineBuilder::new()
        .encoder(Arc::new(polite_model()))
        .decoder(Arc::new(PanickingDecoder))
        .vocabulary(vocabulary())
        .max_input_length(10)
        .build()
        .unwrap();
    let (reply, next) = turn(&engine, "anything", General);
    assert_eq!(reply, APOLOGY_REPLY);
    assert_eq!(next, General);

    // 之后的轮次照常工作
    let (_, next) = turn(&engine, "hi", HasEmail);
    assert_eq!(next, General);
}

#[test]
fn same_input_same_reply() {
    let engine = engine_with(Arc::new(email_asking_model()));
    let first = turn(&engine, "where is my parcel", General);
    let second = turn(&engine, "where is my parcel", General);
    assert_eq!(first, second);
}

#[test]
fn tagged_interface_round_trips_state_names() {
    let engine = engine_with(Arc::new(polite_model()));

    let (reply, tag) = engine.respond_tagged("I want to check my order", "has_email");
    assert!(reply.contains("order number"));
    assert_eq!(tag, "awaiting_order_number");

    // 无法识别的标签按 general 处理
    let (reply, tag) = engine.respond_tagged("what can you do", "no_such_state");
    assert_eq!(reply, "thanks");
    assert_eq!(tag, "general");
}

#[test]
fn unknown_tag_is_treated_as_general() {
    let engine = engine_with(Arc::new(email_asking_model()));

    // 按 general 处理，所以模型回复里的 "email" 会触发状态转移
    let (reply, tag) = engine.respond_tagged("my package never arrived", "awaiting_pizza");
    assert_eq!(reply, "please send email");
    assert_eq!(tag, "awaiting_email");

    // 规则同样按 general 判断：has_email 才有的订单意图不会命中
    let (reply, tag) = engine.respond_tagged("check my order", "Has-Email");
    assert_eq!(reply, "please send email");
    assert_eq!(tag, "awaiting_email");
}

#[test]
fn concurrent_policy_serves_parallel_turns() {
    let model = Arc::new(email_asking_model());
    let engine = ChatEngineBuilder::new()
        .model(model.clone())
        .vocabulary(vocabulary())
        .max_input_length(10)
        .inference_policy(InferencePolicy::Concurrent)
        .build()
        .unwrap();
    assert_eq!(engine.policy(), InferencePolicy::Concurrent);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let engine = engine.clone();
            scope.spawn(move || {
                let reply = engine.respond("is anyone there", General);
                assert_eq!(reply.reply, "please send email");
                assert_eq!(reply.state, AwaitingEmail);
            });
        }
    });
    assert_eq!(model.encode_calls(), 4);
}

#[test]
fn builder_requires_model_and_vocabulary() {
    let err = ChatEngineBuilder::new().build().err().unwrap();
    assert_eq!(err.kind(), chat_engine::ErrorKind::Config);

    let err = ChatEngineBuilder::new()
        .model(Arc::new(polite_model()))
        .max_input_length(10)
        .build()
        .err()
        .unwrap();
    assert!(err.message().contains("vocabulary"));
}
