use utoipa::OpenApi;
use crate::{models, relay::handlers};

#[derive(OpenApi)]
#[openapi(
    paths(handlers::root, handlers::stats),
    components(
        schemas(
            models::RelayInfo,
            models::RelayStats,
            models::ConnectedClient,
            models::RelayCommand,
            models::ForwardedMessage
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_http_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/"));
        assert!(doc.paths.paths.contains_key("/stats"));
    }
}
