//! Basic usage example.
//!
//! ```text,ignore
//! $ cargo run --example basic -- \
//!   --nick my_bot \
//!   --token oauth:yfvzjqb705z12hrhy1zkwa9xt7v662 \
//!   --channel forsen \
//!   --client-id gp762nuuoqcoxypju8c569th9wz7q5
//! ```

use anyhow::Result;
use clap::Parser;
use cogbot::cog::{Arity, Cog, Command, Permission};
use cogbot::log::{ChatFormat, LogConfig, LogLevel, LogRecord};
use cogbot::{Bot, BotError, Config, Context, Credentials, EventHandler, Helix, Message};
use std::sync::Arc;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(author, version)]
struct Args {
  /// Login name of the bot account
  #[arg(long)]
  nick: String,

  /// Login oauth2 token
  #[arg(long)]
  token: String,

  /// Channel to join
  #[arg(long)]
  channel: String,

  /// Client id used for Helix requests
  #[arg(long)]
  client_id: Option<String>,
}

struct Greeter {
  greeting: String,
}

async fn hello(this: Arc<Greeter>, ctx: Context, msg: Message) -> Result<(), BotError> {
  ctx.reply(&msg, format!("{} {}", this.greeting, msg.sender().name()));
  Ok(())
}

async fn echo(_: Arc<Greeter>, ctx: Context, msg: Message) -> Result<(), BotError> {
  ctx.send(msg.arg_text());
  Ok(())
}

async fn add(_: Arc<Greeter>, ctx: Context, msg: Message) -> Result<(), BotError> {
  let [a, b] = msg.args() else {
    return Err(BotError::BadArguments);
  };
  let (Ok(a), Ok(b)) = (a.parse::<i64>(), b.parse::<i64>()) else {
    return Err(BotError::BadArguments);
  };
  ctx.send(format!("{a} + {b} = {}", a + b));
  Ok(())
}

async fn add_usage(_: Arc<Greeter>, ctx: Context, msg: Message) -> Result<(), BotError> {
  ctx.reply(&msg, "usage: !add <a> <b>");
  Ok(())
}

async fn join(_: Arc<Greeter>, ctx: Context, msg: Message) -> Result<(), BotError> {
  ctx.change_room(msg.arg_text());
  Ok(())
}

async fn quit(_: Arc<Greeter>, ctx: Context, _: Message) -> Result<(), BotError> {
  ctx.send("bye");
  Err(BotError::Exit)
}

struct Printer;

impl EventHandler for Printer {
  fn on_log(&self, record: &LogRecord) {
    if record.level >= LogLevel::Warning {
      eprintln!("[{}] {}", record.category, record.text);
    }
  }

  async fn on_connect(&self, ctx: &Context) {
    ctx.send("connected");
  }

  async fn on_command_not_found(&self, ctx: &Context, msg: &Message) {
    ctx.reply(msg, "no such command");
  }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let config = Config::new(Credentials::new(&args.nick, &args.token), &args.channel).log(
    LogConfig::default()
      .level(LogLevel::Message)
      .chat_format(ChatFormat::new("#{channel} {name}: {text}")),
  );

  let greeter = Cog::builder(
    "!",
    Greeter {
      greeting: "hello".into(),
    },
  )
  .name("greeter")
  .command(Command::new("hello", hello).aliases(["hi", "hey"]))
  .command(Command::new("echo", echo))
  .command(Command::new("add", add).arity(2))
  .command(Command::new("add", add_usage).arity(Arity::Any))
  .command(
    Command::new("join", join)
      .arity(1)
      .permission(Permission::Moderator),
  )
  .command(
    Command::new("quit", quit)
      .permission(Permission::Broadcaster)
      .whitelist([args.nick.clone()]),
  )
  .build();

  let mut builder = Bot::builder(config).events(Printer).cog(greeter);
  if let Some(client_id) = &args.client_id {
    builder = builder.helix(Helix::new(client_id, &args.token)?);
  }

  builder.build().run().await?;

  Ok(())
}
