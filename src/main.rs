use mimalloc::MiMalloc;
use std::process;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemBuilder, Toplevel};
use tracing::{error, info, warn};
use tsgate::{
    gateway::check_upstreams, r#const::server_defaults, subsystem_names, AdminServer, AppError,
    Args, Config, DnsBridgeServer, Gateway, GatewayServer, ProxyOverlayProvider,
};

// 使用 mimalloc 分配器提高内存效率
#[global_allocator]
static GLOBAL: MiMalloc = mimalloc::MiMalloc;

fn init_logging(args: &Args) {
    let builder = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_line_number(false);

    // 如果启用调试模式，输出调试信息，否则只输出 info 及以上级别
    if args.debug {
        builder.with_max_level(tracing::Level::DEBUG)
    } else {
        builder.with_max_level(tracing::Level::INFO)
    }
    .init();
}

// 程序入口
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 解析命令行参数
    let args = Args::parse_args();

    // 初始化日志
    init_logging(&args);

    // 验证参数
    if let Err(e) = args.validation() {
        error!("Invalid command line arguments: {}", e);
        process::exit(1);
    }

    info!("Starting tsgate reverse-proxy gateway");

    // 加载配置
    let config = match Config::from_file(&args.config) {
        Ok(config) => {
            info!("Successfully loaded configuration: {:?}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration file: {}", e);
            process::exit(1);
        }
    };

    // 如果是测试模式，成功验证配置后退出
    if args.test_config {
        if let Err(e) = check_upstreams(&config) {
            error!("Invalid upstream configuration: {}", e);
            process::exit(1);
        }
        info!("Configuration file validation successful");
        return Ok(());
    }

    // 创建应用组件
    let components = match create_components(&config).await {
        Ok(components) => components,
        Err(e) => {
            error!("Failed to create application components: {}", e);
            process::exit(1);
        }
    };

    // 创建优雅关闭顶层管理器
    let toplevel = Toplevel::new(|s| async move {
        // 启动DNS桥接服务器子系统
        for bridge in components.bridges {
            let name = bridge.name().to_string();
            s.start(SubsystemBuilder::new(name, move |s| async move {
                bridge.run(s).await
            }));
        }
        // 启动管理服务器子系统
        let admin_server = components.admin_server;
        s.start(SubsystemBuilder::new(
            subsystem_names::ADMIN_SERVER,
            move |s| async move { admin_server.run(s).await },
        ));
        // 启动网关服务器子系统
        let gateway_server = components.gateway_server;
        s.start(SubsystemBuilder::new(
            subsystem_names::GATEWAY_SERVER,
            move |s| async move { gateway_server.run(s).await },
        ));
    });

    // 等待关闭
    info!("All services started, waiting for requests...");
    match toplevel
        .catch_signals()
        .handle_shutdown_requests(tokio::time::Duration::from_secs(args.shutdown_timeout))
        .await
    {
        Ok(_) => {
            info!("Application gracefully shut down");
            Ok(())
        }
        Err(e) => {
            error!("Application shutdown error: {}", e);
            process::exit(1);
        }
    }
}

// 应用组件
struct AppComponents {
    // 网关服务器
    gateway_server: GatewayServer,
    // DNS 桥接服务器
    bridges: Vec<DnsBridgeServer>,
    // 管理服务器
    admin_server: AdminServer,
}

// 创建应用组件
async fn create_components(config: &Config) -> Result<AppComponents, AppError> {
    // 创建管理服务器
    let admin_listen_addr = match &config.admin {
        Some(admin_config) => admin_config.listen.parse()?,
        None => {
            warn!(
                "Admin server configuration not provided, using default address {}",
                server_defaults::DEFAULT_ADMIN_LISTEN
            );
            server_defaults::DEFAULT_ADMIN_LISTEN.parse()?
        }
    };
    let admin_server = AdminServer::new(admin_listen_addr);

    // 组装网关
    let gateway = Gateway::assemble(config, &ProxyOverlayProvider).await?;
    info!(
        "Gateway assembled with {} upstream(s), {} middleware(s), {} DNS bridge(s)",
        config.upstreams.len(),
        config.middlewares.len(),
        gateway.bridge_addrs().len()
    );

    let (gateway_server, bridges) = gateway.into_parts();

    // 返回应用组件
    Ok(AppComponents {
        gateway_server,
        bridges,
        admin_server,
    })
}
