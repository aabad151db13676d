// 中间件管道:
// - policy: 外部策略决策中间件
// - opa: 决策引擎客户端

pub mod opa;
pub mod policy;

use crate::config::{HttpClientConfig, MiddlewareConfig};
use crate::error::AppError;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use std::sync::Arc;
use tracing::debug;

pub use opa::{DecisionEngine, OpaClient};
pub use policy::{PolicyInput, PolicyMiddleware};

/// An HTTP request handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: Request<Body>) -> Response<Body>;
}

pub type BoxHandler = Arc<dyn Handler>;

/// Turns the next handler into a new handler.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    // 包装下一个处理器，返回 None 表示构造失败
    fn wrap(&self, next: BoxHandler) -> Option<BoxHandler>;
}

// 根据配置构造中间件
pub async fn from_config(
    config: &MiddlewareConfig,
    http_config: &HttpClientConfig,
) -> Result<Arc<dyn Middleware>, AppError> {
    match config {
        MiddlewareConfig::Policy { properties } => {
            let engine = OpaClient::connect(properties, http_config).await?;
            Ok(Arc::new(PolicyMiddleware::new(Arc::new(engine))))
        }
    }
}

pub struct Pipeline;

impl Pipeline {
    // 逆序包装，使调用顺序与配置顺序一致（第一个中间件在最外层）
    pub fn build(
        terminal: BoxHandler,
        middlewares: &[Arc<dyn Middleware>],
    ) -> Result<BoxHandler, AppError> {
        let mut handler = terminal;
        for middleware in middlewares.iter().rev() {
            debug!("Wrapping handler with middleware {}", middleware.name());
            handler = middleware
                .wrap(handler)
                .ok_or_else(|| AppError::MiddlewareReturnedNoHandler(middleware.name().to_string()))?;
        }
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::sync::Mutex;

    struct Terminal {
        trace: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Handler for Terminal {
        async fn handle(&self, _request: Request<Body>) -> Response<Body> {
            self.trace.lock().unwrap().push("terminal".to_string());
            Response::new(Body::empty())
        }
    }

    struct Tracing {
        name: String,
        trace: Arc<Mutex<Vec<String>>>,
    }

    struct TracingHandler {
        name: String,
        trace: Arc<Mutex<Vec<String>>>,
        next: BoxHandler,
    }

    #[async_trait]
    impl Handler for TracingHandler {
        async fn handle(&self, request: Request<Body>) -> Response<Body> {
            self.trace.lock().unwrap().push(self.name.clone());
            self.next.handle(request).await
        }
    }

    impl Middleware for Tracing {
        fn name(&self) -> &str {
            &self.name
        }

        fn wrap(&self, next: BoxHandler) -> Option<BoxHandler> {
            Some(Arc::new(TracingHandler {
                name: self.name.clone(),
                trace: self.trace.clone(),
                next,
            }))
        }
    }

    struct Broken;

    impl Middleware for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn wrap(&self, _next: BoxHandler) -> Option<BoxHandler> {
            None
        }
    }

    #[tokio::test]
    async fn test_call_order_matches_config_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let middlewares: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Tracing {
                name: "first".to_string(),
                trace: trace.clone(),
            }),
            Arc::new(Tracing {
                name: "second".to_string(),
                trace: trace.clone(),
            }),
        ];
        let handler = Pipeline::build(
            Arc::new(Terminal {
                trace: trace.clone(),
            }),
            &middlewares,
        )
        .unwrap();

        let response = handler
            .handle(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["first", "second", "terminal"]
        );
    }

    #[test]
    fn test_missing_handler_fails_build() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let middlewares: Vec<Arc<dyn Middleware>> = vec![Arc::new(Broken)];
        let result = Pipeline::build(Arc::new(Terminal { trace }), &middlewares);
        assert!(matches!(
            result,
            Err(AppError::MiddlewareReturnedNoHandler(name)) if name == "broken"
        ));
    }
}
