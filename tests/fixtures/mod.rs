//! Request payloads and tokens shared by the integration tests

#![allow(dead_code)]

use collectible_queue::models::params::{
    CustomParams, GenerationParams, Rank, RandomParams, Rarity, Suit,
};
use collectible_queue::routes::auth::Claims;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WORKER_SECRET: &str = "test-worker-secret";

/// A random-variant king of hearts.
pub fn king_of_hearts() -> GenerationParams {
    GenerationParams::Random(RandomParams {
        rank: Rank::King,
        suit: Suit::Hearts,
        rarity: Rarity::Rare,
    })
}

pub fn custom_card(style_prompt: &str) -> GenerationParams {
    GenerationParams::Custom(CustomParams {
        rank: Rank::Queen,
        suit: Suit::Spades,
        rarity: Rarity::Epic,
        style_prompt: style_prompt.to_string(),
        style_image: None,
    })
}

/// Wire form of a random request, as a client would send it.
pub fn random_request_body() -> Value {
    json!({
        "variant": "random",
        "rank": "K",
        "suit": "hearts",
        "rarity": "rare"
    })
}

/// HS256 bearer token for `sub`, valid for ten minutes.
pub fn bearer_token(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: chrono::Utc::now().timestamp() + 600,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign test token");
    format!("Bearer {token}")
}
