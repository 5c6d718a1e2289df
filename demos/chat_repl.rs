//! # 终端聊天示例
//!
//! 这个示例展示了如何把 `ChatController` 接到一个最简单的展示层上：
//! - 从环境变量加载配置（`ID`、`API_TOKEN`）
//! - 输入问题后实时打印增量回答
//! - 生成过程中输入 `/stop` 取消
//! - `/new` 开始新对话，`/model <id>` 切换模型，`/models` 列出模型，`/quit` 退出

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use workers_chat::{ChatController, ChatError, ChatSnapshot, Config, Result, config::KNOWN_MODELS};

/// 打印回答中尚未输出的部分
fn render(snapshot: &ChatSnapshot, shown: &mut String) -> Result<()> {
    let Some(entry) = snapshot.entries.last() else {
        return Ok(());
    };
    let mut stdout = std::io::stdout();
    match entry.answer.strip_prefix(shown.as_str()) {
        Some(delta) => write!(stdout, "{}", delta)?,
        // 回答被错误信息替换
        None => write!(stdout, "\n{}", entry.answer)?,
    }
    stdout.flush()?;
    shown.clone_from(&entry.answer);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Config::from_env()?;
    let chat = ChatController::from_config(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("当前模型: {}（/models 查看可选模型）", chat.model());

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" => break,
            "/models" => KNOWN_MODELS.iter().for_each(|m| println!("  {}", m)),
            "/new" => match chat.reset_conversation() {
                Ok(()) => println!("已开始新对话"),
                Err(e) => eprintln!("错误: {}", e),
            },
            _ if line.starts_with("/model ") => {
                chat.change_model(line["/model ".len()..].trim());
                println!("下一轮使用模型: {}", chat.model());
            }
            question => {
                let mut updates = chat.subscribe();
                let mut run = tokio::spawn(chat.start(question)?.run());
                let mut shown = String::new();

                let outcome = loop {
                    tokio::select! {
                        outcome = &mut run => {
                            break outcome.map_err(|e| ChatError::Io(std::io::Error::other(e)))?;
                        }
                        Ok(()) = updates.changed() => {
                            let snapshot = updates.borrow_and_update().clone();
                            render(&snapshot, &mut shown)?;
                        }
                        input = lines.next_line() => match input? {
                            Some(cmd) if cmd.trim() == "/stop" => {
                                chat.cancel().ok();
                            }
                            Some(_) => eprintln!("\n(生成中，输入 /stop 停止)"),
                            None => {
                                chat.cancel().ok();
                            }
                        },
                    }
                };

                render(&chat.snapshot(), &mut shown)?;
                println!("\n[{:?}]", outcome);
            }
        }
    }

    Ok(())
}
