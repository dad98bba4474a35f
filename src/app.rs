use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use nodepool_api::{create_app, AppState};
use nodepool_core::config::{AppConfig, StorageBackend};
use nodepool_core::traits::{BlobStore, ResourceWeightedCost};
use nodepool_dispatcher::{NodePool, PoolContext, PoolSettings, ScheduleTrigger};
use nodepool_infrastructure::{
    observability::init_metrics, FsBlobStore, InMemoryBlobStore, InMemoryCreditLedger,
    InMemoryNodeRepository, InMemoryTaskRepository, MailboxNotifier, MetricsCollector,
};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

/// 主应用程序
pub struct Application {
    config: AppConfig,
    pool: Arc<NodePool>,
    mailbox: Arc<MailboxNotifier>,
    credits: Arc<InMemoryCreditLedger>,
    metrics_handle: Option<PrometheusHandle>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化节点池主控");

        // recorder需先于指标句柄创建
        let metrics_handle = if config.observability.metrics_enabled {
            Some(init_metrics()?)
        } else {
            None
        };
        let metrics = Arc::new(MetricsCollector::new().context("创建指标收集器失败")?);

        let blobs = create_blob_store(&config).await?;
        let credits = Arc::new(InMemoryCreditLedger::new(&config.credit));
        if !credits.is_enabled() {
            info!("积分校验已关闭, 所有提交均被授权");
        }
        let mailbox = Arc::new(MailboxNotifier::default());

        let ctx = PoolContext {
            tasks: Arc::new(InMemoryTaskRepository::new()),
            nodes: Arc::new(InMemoryNodeRepository::new()),
            credit: credits.clone(),
            blobs,
            notifier: mailbox.clone(),
            cost_model: Arc::new(ResourceWeightedCost),
            metrics,
            trigger: ScheduleTrigger::new(),
            settings: PoolSettings::from(&config),
        };

        Ok(Self {
            config,
            pool: Arc::new(NodePool::new(ctx)),
            mailbox,
            credits,
            metrics_handle,
        })
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            pool: self.pool.clone(),
            mailbox: self.mailbox.clone(),
            credits: self.credits.clone(),
            config: self.config.api.clone(),
            metrics: self.metrics_handle.clone(),
        };
        create_app(state, &self.config.observability)
    }

    /// 启动后台循环和HTTP服务，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let handles = self.pool.spawn_background(&shutdown_rx);
        info!("后台循环已启动: 调度、心跳监控、生命周期看门狗");

        if self.config.api.enabled {
            let listener = TcpListener::bind(&self.config.api.bind_address)
                .await
                .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
            info!("API服务器启动在 http://{}", self.config.api.bind_address);

            let mut server_shutdown = shutdown_rx.resubscribe();
            let served = axum::serve(listener, self.router())
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.recv().await;
                    info!("API服务器收到关闭信号");
                })
                .await;
            if let Err(e) = served {
                error!("API服务器运行失败: {}", e);
            }
        } else {
            info!("API服务器未启用");
            let _ = shutdown_rx.recv().await;
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台循环异常退出: {}", e);
            }
        }

        info!("节点池主控已停止");
        Ok(())
    }
}

async fn create_blob_store(config: &AppConfig) -> Result<Arc<dyn BlobStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("使用内存Blob存储");
            Ok(Arc::new(InMemoryBlobStore::new()))
        }
        StorageBackend::Filesystem => {
            info!("使用文件Blob存储: {}", config.storage.path.display());
            let store = FsBlobStore::new(config.storage.path.clone())
                .await
                .context("初始化文件存储失败")?;
            Ok(Arc::new(store))
        }
    }
}
