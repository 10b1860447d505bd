use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zhouyi::adapters::interpreter::RewardOutcome;
use zhouyi::config::{Command, HistoryAction, LocalAction};
use zhouyi::core::{ConfigProvider, ReadingStore};
use zhouyi::domain::model::LineValue;
use zhouyi::utils::{logger, validation};
use zhouyi::{
    CliConfig, DivinationError, HexagramRepository, InMemoryDataset, InterpreterClient,
    LocalReadingStore, ReadingSession,
};

fn render_line(line: LineValue) -> &'static str {
    match line {
        LineValue::OldYang => "───────  ○",
        LineValue::YoungYang => "───────",
        LineValue::OldYin => "──   ──  ×",
        LineValue::YoungYin => "──   ──",
    }
}

fn print_hexagram(lines: &[LineValue]) {
    // 由上而下繪出卦象
    for line in lines.iter().rev() {
        println!("  {}", render_line(*line));
    }
}

async fn run(config: CliConfig) -> Result<(), DivinationError> {
    validation::validate_base_url("api_base_url", config.api_base_url())?;

    let dataset = InMemoryDataset::bundled()?;
    let repository = HexagramRepository::new(dataset);
    let store = Arc::new(LocalReadingStore::new(config.store_path()));
    let client = InterpreterClient::new(
        config.api_base_url(),
        config.auth_token().map(str::to_string),
    );

    match &config.command {
        Command::Cast {
            question,
            ask,
            unlock_token,
        } => {
            validation::validate_question(question)?;

            let mut session =
                ReadingSession::new(repository, Some(store), config.line_delay());
            let mut rng = rand::thread_rng();

            println!("問：{question}");
            let context = session
                .cast(question, &mut rng, |lines| {
                    // 每揭示一爻即回報進度
                    if let Some(line) = lines.last() {
                        println!("  第 {} 爻：{}", lines.len(), render_line(*line));
                    }
                })
                .await?
                .clone();

            println!();
            println!("得卦：{}（{}）", context.display_name, context.trigram_title);
            print_hexagram(session.revealed_lines());
            println!();
            println!("卦辭：{}", context.judgment);
            for text in &context.changing_line_texts {
                println!("動爻：{text}");
            }

            if *ask {
                println!();
                let cancel = CancellationToken::new();
                let mut stdout = std::io::stdout();
                let outcome = session
                    .request_interpretation(
                        &client,
                        unlock_token.as_deref(),
                        &cancel,
                        &mut |fragment| {
                            print!("{fragment}");
                            let _ = stdout.flush();
                        },
                    )
                    .await?;
                println!();
                if let Some(usage) = &outcome.usage {
                    tracing::info!(
                        "token usage: input {} output {} total {}",
                        usage.input_tokens,
                        usage.output_tokens,
                        usage.total_tokens
                    );
                }
            }
        }

        Command::History { action } => match action {
            HistoryAction::List { limit, offset } => {
                let page = client.history_list(*limit, *offset).await?;
                println!("共 {} 筆記錄", page.total);
                for item in &page.items {
                    let pin = if item.is_pinned { "📌 " } else { "" };
                    println!("  [{}] {pin}{} ({})", item.reading_id, item.question, item.created_at);
                }
            }
            HistoryAction::Show { reading_id } => {
                let detail = client.history_detail(*reading_id).await?;
                println!("問：{}", detail.question);
                if let Some(code) = &detail.hexagram_code {
                    println!("卦碼：{code}");
                }
                println!();
                println!("{}", detail.content);
            }
            HistoryAction::Pin { reading_id, unpin } => {
                let pinned = client.set_pinned(*reading_id, !unpin).await?;
                println!("✅ 記錄 {reading_id} {}", if pinned { "已釘選" } else { "已取消釘選" });
            }
            HistoryAction::Delete { reading_id } => {
                client.delete_reading(*reading_id).await?;
                println!("✅ 記錄 {reading_id} 已刪除");
            }
        },

        Command::Local { action } => match action {
            LocalAction::List { limit } => {
                let items = store.list(*limit).await?;
                if items.is_empty() {
                    println!("本機尚無記錄");
                }
                for item in &items {
                    println!(
                        "  [{}] {} → {}（{}） {}",
                        item.id,
                        item.question,
                        item.display_name,
                        item.hexagram_code,
                        item.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            LocalAction::Delete { reading_id } => {
                if store.delete(*reading_id).await? {
                    println!("✅ 記錄 {reading_id} 已刪除");
                } else {
                    println!("找不到記錄 {reading_id}");
                }
            }
        },

        Command::Reward { provider, ad_proof } => {
            match client.complete_ad(provider, ad_proof).await? {
                RewardOutcome::Silver {
                    silver_granted,
                    new_silver_balance,
                } => {
                    println!("✅ 獲得 {silver_granted} 銀兩，餘額 {new_silver_balance}");
                }
                RewardOutcome::Unlock {
                    ad_session_token,
                    expires_in,
                } => {
                    println!("✅ 解鎖令牌：{ad_session_token}（{expires_in} 秒內有效）");
                    println!("💡 可用 --unlock-token 重新請求解卦");
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting zhouyi CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = run(config).await {
        tracing::error!("❌ Command failed: {e}");
        eprintln!("❌ {e}");
        if matches!(e, DivinationError::InsufficientFunds) {
            eprintln!("💡 餘額不足：可先執行 zhouyi reward <proof> 換取解鎖令牌");
        }
        std::process::exit(if e.is_recoverable() { 2 } else { 1 });
    }
}
