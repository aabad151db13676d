use crate::error::AppError;
use crate::metrics;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tracing::{error, info};

// 管理服务器（健康检查与指标）
pub struct AdminServer {
    // 监听地址
    listen_addr: SocketAddr,
}

impl AdminServer {
    // 创建新的管理服务器
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self { listen_addr }
    }

    // 管理路由
    pub fn router() -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .merge(metrics::metrics_routes())
    }

    // 启动管理服务器，直到关闭信号到来
    pub async fn serve<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!("Admin server listening on {}", self.listen_addr);

        axum::serve(listener, Self::router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl IntoSubsystem<AppError> for AdminServer {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), AppError> {
        let shutdown = async move {
            subsys.on_shutdown_requested().await;
            info!("Received subsystem shutdown request, admin server is stopping");
        };

        match self.serve(shutdown).await {
            Ok(()) => {
                info!("Admin server stopped");
                Ok(())
            }
            Err(err) => {
                error!("Admin server error: {}", err);
                Err(err)
            }
        }
    }
}

// 健康检查处理程序
async fn health_handler() -> &'static str {
    "OK"
}
