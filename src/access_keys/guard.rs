use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};

/// A key from the `api-key` header, or from `Authorization: Bearer <key>`
/// as sent by the message-bus webhook.
pub struct ApiKey<'r>(pub &'r str);

#[derive(Debug)]
pub enum ApiKeyError {
    Missing,
    Invalid,
}

impl std::fmt::Display for ApiKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiKeyError::Missing => write!(f, "the key is missing"),
            ApiKeyError::Invalid => write!(f, "the key is invalid"),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApiKey<'r> {
    type Error = ApiKeyError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        fn is_valid(key: &str) -> bool {
            !key.is_empty() && key.chars().all(|c| c.is_ascii_graphic())
        }

        let headers = request.headers();
        let key = headers.get_one("api-key").or_else(|| {
            headers
                .get_one("Authorization")
                .and_then(|value| value.strip_prefix("Bearer "))
        });

        match key.map(str::trim) {
            None => Outcome::Error((Status::Unauthorized, ApiKeyError::Missing)),
            Some(key) if is_valid(key) => Outcome::Success(ApiKey(key)),
            _ => Outcome::Error((Status::BadRequest, ApiKeyError::Invalid)),
        }
    }
}
