//! 积分与好友核心 CLI
//!
//! 直接操作本地 SQLite 数据库，用于运维和联调：开通用户、好友邀请/接受/删除、
//! 发放积分、好友码编解码。每个子命令以 JSON 输出结果。

use anyhow::Result;
use clap::{Parser, Subcommand};
use rewards_core::{
    FriendsCodeAllocator, NewUser, PointReason, RewardsConfig, RewardsCore, RewardsListener,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// 积分与好友核心 CLI
#[derive(Parser, Debug)]
#[command(name = "rewards-cli")]
#[command(about = "积分与好友核心 CLI - 用于运维和联调", long_about = None)]
struct Args {
    /// SQLite 数据库 URL（覆盖配置文件中的 dbUrl）
    #[arg(long)]
    db: Option<String>,

    /// JSON 配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,

    /// 日志级别（默认: info,rewards_core=debug）
    #[arg(long, default_value = "info,rewards_core=debug")]
    log_level: String,

    /// 额外写入的日志文件
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 开通用户并分配好友码
    Provision {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
    },
    /// 为缺失好友码的用户补发好友码
    Backfill,
    /// 通过好友码发起好友邀请
    Invite {
        /// 邀请人用户 id
        #[arg(long)]
        user_id: i64,
        /// 被邀请人的好友码
        #[arg(long)]
        code: String,
    },
    /// 接受好友邀请
    Accept {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        friendship_id: i64,
    },
    /// 拒绝邀请或解除好友关系
    Remove {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        friendship_id: i64,
    },
    /// 查询好友列表
    List {
        #[arg(long)]
        user_id: i64,
    },
    /// 按行为发放积分
    Award {
        #[arg(long)]
        user_id: i64,
        /// content-created / content-viewed / reaction-posted /
        /// friendship-formed / profile-edited / audio-listened
        #[arg(long)]
        reason: PointReason,
    },
    /// 查询用户（按 id、uid 或好友码）
    Show {
        #[arg(long, conflicts_with_all = ["uid", "code"])]
        user_id: Option<i64>,
        #[arg(long, conflicts_with = "code")]
        uid: Option<String>,
        #[arg(long)]
        code: Option<String>,
    },
    /// 序号 → 好友码
    Encode {
        #[arg(long, allow_negative_numbers = true)]
        ordinal: i64,
    },
    /// 好友码 → 序号
    Decode {
        #[arg(long)]
        code: String,
    },
}

/// 初始化日志（控制台，可选同时写入文件）
fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 日志输出到 stderr，stdout 只留给 JSON 结果
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 输出到文件，禁用 ANSI 颜色代码（文件不需要颜色）
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file {
        info!("[CLI] 📝 日志同时写入文件: {}", path.display());
    }
    Ok(())
}

/// 事件监听器：把回调打印到日志
struct CliRewardsListener;

#[async_trait::async_trait]
impl RewardsListener for CliRewardsListener {
    async fn on_points_awarded(&self, user_id: i64, delta: i64, total: i64) {
        info!("[CLI/Points] 🎉 用户 {} +{}，总分 {}", user_id, delta, total);
    }

    async fn on_friendship_invited(&self, friendship_json: String) {
        info!("[CLI/Friendship] 📨 新邀请: {}", friendship_json);
    }

    async fn on_friendship_accepted(&self, friendship_json: String) {
        info!("[CLI/Friendship] 🤝 邀请已接受: {}", friendship_json);
    }

    async fn on_friendship_removed(&self, friendship_id: i64, acting_user_id: i64) {
        info!(
            "[CLI/Friendship] 🗑️ 好友关系 {} 被用户 {} 删除",
            friendship_id, acting_user_id
        );
    }
}

fn load_config(args: &Args) -> Result<RewardsConfig> {
    let mut config = match &args.config {
        Some(path) => RewardsConfig::from_json_file(path)?,
        None => RewardsConfig::default(),
    };
    if let Some(db) = &args.db {
        config.db_url = db.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    // 编解码不需要数据库
    match &args.command {
        Command::Encode { ordinal } => {
            let config = load_config(&args)?;
            let allocator = FriendsCodeAllocator::new(config.friends_code_width)?;
            return print_json(&serde_json::json!({
                "ordinal": ordinal,
                "code": allocator.encode(*ordinal)?,
            }));
        }
        Command::Decode { code } => {
            let config = load_config(&args)?;
            let allocator = FriendsCodeAllocator::new(config.friends_code_width)?;
            return print_json(&serde_json::json!({
                "code": code,
                "ordinal": allocator.decode(code)?,
            }));
        }
        _ => {}
    }

    let config = load_config(&args)?;
    let core = RewardsCore::connect_with_listener(config, Arc::new(CliRewardsListener)).await?;

    let result = match args.command {
        Command::Provision {
            uid,
            username,
            email,
        } => print_json(&core.provision_user(&NewUser::new(uid, username, email)).await?),
        Command::Backfill => print_json(&serde_json::json!({
            "assigned": core.backfill_friends_codes().await?,
        })),
        Command::Invite { user_id, code } => {
            print_json(&core.create_friendship(user_id, &code).await?)
        }
        Command::Accept {
            user_id,
            friendship_id,
        } => print_json(&core.accept_friendship(user_id, friendship_id).await?),
        Command::Remove {
            user_id,
            friendship_id,
        } => {
            core.decline_or_remove_friendship(user_id, friendship_id)
                .await?;
            print_json(&serde_json::json!({ "removed": friendship_id }))
        }
        Command::List { user_id } => print_json(&core.list_friendships(user_id).await?),
        Command::Award { user_id, reason } => {
            print_json(&core.award_points(user_id, reason).await?)
        }
        Command::Show { user_id, uid, code } => {
            let user = match (user_id, uid, code) {
                (Some(id), _, _) => core.user_by_id(id).await?,
                (None, Some(uid), _) => core.user_by_uid(&uid).await?,
                (None, None, Some(code)) => core.user_by_code(&code).await?,
                (None, None, None) => {
                    return Err(anyhow::anyhow!("需要 --user-id、--uid 或 --code 之一"));
                }
            };
            print_json(&user)
        }
        Command::Encode { .. } | Command::Decode { .. } => Ok(()),
    };

    core.close().await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    init_logger(&args.log_level, args.log_file.as_ref())?;

    info!("[CLI] 🚀 积分与好友核心 CLI: {:?}", args.command);
    if let Err(e) = run(args).await {
        // 业务错误带上错误类别，便于脚本判断
        match e.downcast_ref::<rewards_core::RewardsError>() {
            Some(rewards_err) => error!("[CLI] ❌ {:?}: {}", rewards_err.kind(), rewards_err),
            None => error!("[CLI] ❌ {:#}", e),
        }
        return Err(e);
    }
    Ok(())
}
