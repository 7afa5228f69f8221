use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use notification_stream_client::{
    BulkOutcome, ClientConfig, ClientError, ClientObserver, ConnectOutcome, ConnectionState,
    LoadOutcome, MutationOutcome, NotificationClient, NotificationRecord,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "nsc")]
#[command(about = "Notification Stream Client - 订阅实时通知并管理已读状态")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/notification-stream-client/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 加载通知并订阅事件流，Ctrl+C 退出
    Watch {
        /// 订阅者 ID
        #[arg(long, short)]
        user: String,
        /// 不发送系统原生通知
        #[arg(long)]
        no_native: bool,
    },
    /// 列出通知
    List {
        /// 订阅者 ID
        #[arg(long, short)]
        user: String,
        /// 只显示未读
        #[arg(long)]
        unread: bool,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 标记通知已读
    Read {
        /// 订阅者 ID
        #[arg(long, short)]
        user: String,
        /// 通知 ID
        id: String,
    },
    /// 删除通知
    Delete {
        /// 订阅者 ID
        #[arg(long, short)]
        user: String,
        /// 通知 ID
        id: String,
    },
    /// 全部标记已读
    ReadAll {
        /// 订阅者 ID
        #[arg(long, short)]
        user: String,
    },
}

/// 把客户端事件打印到终端
struct PrintObserver;

impl ClientObserver for PrintObserver {
    fn on_notification(&self, record: &NotificationRecord) {
        println!("{}", format_record(record));
    }

    fn on_state_change(&self, state: ConnectionState) {
        info!(state = %state, "Connection state");
    }

    fn on_error(&self, error: &ClientError) {
        warn!(error = %error, "Client error");
        if error.is_terminal() {
            eprintln!("自动重连已停止，请重新运行 nsc watch");
        }
    }
}

fn format_record(record: &NotificationRecord) -> String {
    let marker = if record.is_read { " " } else { "●" };
    format!(
        "{} [{}] {} | {} | {} | {}",
        marker,
        record.priority,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.id,
        record.title,
        record.message
    )
}

fn load_config(path: Option<&PathBuf>) -> Result<ClientConfig> {
    match path {
        Some(path) => {
            let mut config = ClientConfig::load_from(path)?;
            config.apply_env();
            Ok(config)
        }
        None => ClientConfig::auto_load(),
    }
}

/// 构建一次性命令用的客户端并加载通知
async fn loaded_client(config: ClientConfig, user: &str) -> Result<NotificationClient> {
    let client = NotificationClient::builder(ClientConfig {
        native_notifications: false,
        ..config
    })
    .build()?;

    match client.load(user).await? {
        LoadOutcome::Loaded { .. } => Ok(client),
        LoadOutcome::Failed(e) => Err(anyhow!(e)),
        other => Err(anyhow!("加载通知失败: {:?}", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug nsc watch --user u1
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notification_stream_client=info,nsc=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Watch { user, no_native } => {
            let client = NotificationClient::builder(ClientConfig {
                native_notifications: config.native_notifications && !no_native,
                ..config
            })
            .observer(Arc::new(PrintObserver))
            .build()?;

            if let LoadOutcome::Loaded { total, unread } = client.load(&user).await? {
                println!("已加载 {} 条通知（{} 条未读）\n", total, unread);
                for record in client.snapshot().records.iter().rev() {
                    println!("{}", format_record(record));
                }
            }

            if client.connect(&user)? == ConnectOutcome::Started {
                info!(user_id = %user, "Watching notifications, press Ctrl+C to stop");
            }

            tokio::signal::ctrl_c().await?;
            client.close();
            println!("\n已断开");
        }
        Commands::List { user, unread, json } => {
            let client = loaded_client(config, &user).await?;
            let snapshot = client.snapshot();
            let records: Vec<&NotificationRecord> = snapshot
                .records
                .iter()
                .filter(|r| !unread || !r.is_read)
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!("共 {} 条通知，{} 条未读:\n", snapshot.records.len(), snapshot.unread_count);
                for record in records {
                    println!("{}", format_record(record));
                }
            }
            client.close();
        }
        Commands::Read { user, id } => {
            let client = loaded_client(config, &user).await?;
            let outcome = client.mark_read(&id).await;
            client.close();
            match outcome {
                MutationOutcome::Applied => println!("已标记已读: {}", id),
                MutationOutcome::NotFound => eprintln!("未找到通知 {}", id),
                MutationOutcome::RolledBack(e) => return Err(anyhow!(e)),
                MutationOutcome::ClientClosed => {}
            }
        }
        Commands::Delete { user, id } => {
            let client = loaded_client(config, &user).await?;
            let outcome = client.delete(&id).await;
            client.close();
            match outcome {
                MutationOutcome::Applied => println!("已删除: {}", id),
                MutationOutcome::NotFound => eprintln!("未找到通知 {}", id),
                MutationOutcome::RolledBack(e) => return Err(anyhow!(e)),
                MutationOutcome::ClientClosed => {}
            }
        }
        Commands::ReadAll { user } => {
            let client = loaded_client(config, &user).await?;
            let outcome = client.mark_all_read().await;
            client.close();
            match outcome {
                BulkOutcome::Applied { count } => println!("已标记 {} 条通知为已读", count),
                BulkOutcome::NothingToDo => println!("没有未读通知"),
                BulkOutcome::Reloaded { failed, error } => {
                    return Err(anyhow!("{} 条通知标记失败，已重新加载: {}", failed, error));
                }
                BulkOutcome::ClientClosed => {}
            }
        }
    }

    Ok(())
}
