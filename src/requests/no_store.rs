use rocket::response::{self, Responder, Response};
use rocket::Request;

/// Wraps a response for polled endpoints so no browser or proxy caches it.
pub struct NoStore<R>(pub R);

impl<'r, 'o: 'r, R: Responder<'r, 'o>> Responder<'r, 'o> for NoStore<R> {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'o> {
        Response::build_from(self.0.respond_to(request)?)
            .raw_header(
                "Cache-Control",
                "no-store, no-cache, must-revalidate, proxy-revalidate",
            )
            .raw_header("Pragma", "no-cache")
            .raw_header("Expires", "0")
            .ok()
    }
}
