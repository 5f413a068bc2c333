use cogbot::client::conn::Endpoint;
use cogbot::client::read::RecvError;
use cogbot::client::{Backoff, ConnectError, ReconnectError};
use cogbot::cog::{Cog, Command};
use cogbot::{Bot, BotError, Config, Context, Credentials, EventHandler, Message, Session};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::TcpListener;

const WELCOME: &str = ":tmi.twitch.tv CAP * ACK :twitch.tv/tags twitch.tv/commands twitch.tv/membership\r\n:tmi.twitch.tv 001 bot :Welcome, GLHF!\r\n";

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
  fn push(&self, event: impl Into<String>) {
    self.0.lock().unwrap().push(event.into());
  }

  fn events(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }
}

impl EventHandler for Recorder {
  fn on_ready(&self) {
    self.push("ready");
  }

  async fn on_run(&self) {
    self.push("run");
  }

  async fn on_connect(&self, _: &Context) {
    self.push("connect");
  }

  async fn on_message(&self, _: &Context, msg: &Message) {
    self.push(format!("message {}", msg.text()));
  }

  async fn on_command_executed(&self, _: &Context, msg: &Message) {
    self.push(format!("executed {} {:?}", msg.text(), msg.args()));
  }

  async fn on_command_not_found(&self, _: &Context, msg: &Message) {
    self.push(format!("not found {}", msg.text()));
  }

  async fn on_not_addressed(&self, _: &Context, msg: &Message) {
    self.push(format!("not addressed {}", msg.text()));
  }

  async fn on_unexpected_termination(&self, _: &Context, error: &BotError) {
    self.push(format!("unexpected: {error}"));
  }

  async fn on_graceful_termination(&self, _: &Context) {
    self.push("graceful");
  }

  async fn on_terminated(&self, ctx: &Context) {
    self.push("terminated");
    ctx.send("bye");
  }
}

async fn ping(_: Arc<()>, ctx: Context, _: Message) -> Result<(), BotError> {
  ctx.send("pong!");
  Ok(())
}

async fn stop(_: Arc<()>, _: Context, _: Message) -> Result<(), BotError> {
  Err(BotError::Exit)
}

fn commands() -> Cog<()> {
  Cog::builder("!", ())
    .command(Command::new("ping", ping))
    .command(Command::new("stop", stop))
    .build()
}

fn config() -> Config {
  Config::new(Credentials::new("bot", "oauth:token"), "ch")
}

fn privmsg(text: &str) -> String {
  format!(
    "@badge-info=;badges=broadcaster/1;display-name=Ann;id=m1;mod=0;room-id=1;subscriber=0;user-id=1 :ann!ann@ann.tmi.twitch.tv PRIVMSG #ch :{text}\r\n"
  )
}

/// Plays the server side of a session: answers the handshake, then writes each
/// line of `script` after its delay. Returns every line received from the bot.
async fn serve(remote: DuplexStream, script: Vec<(Duration, String)>, close: bool) -> Vec<String> {
  let (reader, mut writer) = tokio::io::split(remote);
  let mut lines = BufReader::new(reader).lines();

  let mut received = Vec::new();
  for _ in 0..3 {
    received.push(lines.next_line().await.unwrap().unwrap());
  }
  writer.write_all(WELCOME.as_bytes()).await.unwrap();

  tokio::spawn(async move {
    for (delay, line) in script {
      tokio::time::sleep(delay).await;
      writer.write_all(line.as_bytes()).await.unwrap();
    }
    if close {
      writer.shutdown().await.unwrap();
    }
  });

  while let Ok(Some(line)) = lines.next_line().await {
    received.push(line);
  }
  received
}

async fn connect(
  script: Vec<(Duration, String)>,
  close: bool,
) -> (Session, tokio::task::JoinHandle<Vec<String>>) {
  let (client, remote) = tokio::io::duplex(4096);
  let server = tokio::spawn(serve(remote, script, close));
  let session = Session::connect_over(config(), client).await.unwrap();
  (session, server)
}

#[tokio::test]
async fn dispatches_commands_in_order() {
  let script = ["!ping", "!pong", "hello", "!stop"]
    .into_iter()
    .map(|text| (Duration::ZERO, privmsg(text)))
    .collect::<Vec<_>>();
  let (session, server) = connect(script, false).await;

  let recorder = Recorder::default();
  let result = Bot::builder(config())
    .events(recorder.clone())
    .cog(commands())
    .build()
    .run_on(session)
    .await;
  assert!(result.is_ok());

  assert_eq!(
    recorder.events(),
    [
      "ready",
      "run",
      "connect",
      "message !ping",
      "executed !ping []",
      "message !pong",
      "not found !pong",
      "message hello",
      "not addressed hello",
      "message !stop",
      "graceful",
      "terminated",
    ]
  );

  let lines = server.await.unwrap();
  assert_eq!(
    lines[..4],
    [
      "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership",
      "PASS oauth:token",
      "NICK bot",
      "JOIN #ch",
    ]
  );
  assert!(lines.contains(&"PRIVMSG #ch :pong!".to_owned()));
  assert_eq!(lines.last().unwrap(), "PRIVMSG #ch :bye");
}

#[tokio::test]
async fn answers_keepalive() {
  let script = vec![
    (Duration::ZERO, "PING :tmi.twitch.tv\r\n".to_owned()),
    (Duration::ZERO, privmsg("!stop")),
  ];
  let (session, server) = connect(script, false).await;

  Bot::builder(config())
    .cog(commands())
    .build()
    .run_on(session)
    .await
    .unwrap();

  let lines = server.await.unwrap();
  assert!(lines.contains(&"PONG :tmi.twitch.tv".to_owned()));
}

#[tokio::test]
async fn closed_stream_is_unexpected() {
  let (session, server) = connect(vec![(Duration::ZERO, privmsg("!ping"))], true).await;

  let recorder = Recorder::default();
  let result = Bot::builder(config())
    .events(recorder.clone())
    .cog(commands())
    .build()
    .run_on(session)
    .await;
  assert!(matches!(
    result,
    Err(BotError::Recv(RecvError::StreamClosed))
  ));

  assert_eq!(
    recorder.events(),
    [
      "ready",
      "run",
      "connect",
      "message !ping",
      "executed !ping []",
      "unexpected: failed to read message: stream closed",
      "terminated",
    ]
  );

  let lines = server.await.unwrap();
  assert!(lines.contains(&"PRIVMSG #ch :pong!".to_owned()));
  assert_eq!(lines.last().unwrap(), "PRIVMSG #ch :bye");
}

#[tokio::test]
async fn failed_auth_stops_startup() {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let port = listener.local_addr().unwrap().port();
  tokio::spawn(async move {
    let (stream, _) = listener.accept().await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    for _ in 0..3 {
      lines.next_line().await.unwrap();
    }
    writer
      .write_all(b":tmi.twitch.tv CAP * ACK :twitch.tv/tags\r\n:tmi.twitch.tv NOTICE * :Login authentication failed\r\n")
      .await
      .unwrap();
    while let Ok(Some(_)) = lines.next_line().await {}
  });

  let recorder = Recorder::default();
  let config = config().endpoint(Endpoint::plain("127.0.0.1", port));
  let result = Bot::builder(config)
    .events(recorder.clone())
    .build()
    .run()
    .await;

  assert!(matches!(
    result,
    Err(BotError::Connect(ConnectError::InvalidAuth))
  ));
  assert_eq!(recorder.events(), ["ready", "run"]);
}

#[tokio::test(start_paused = true)]
async fn background_tasks_run_alongside_chat() {
  let script = vec![
    (Duration::from_secs(1), privmsg("hi 1")),
    (Duration::from_secs(2), privmsg("hi 3")),
    (Duration::from_secs(2), privmsg("!stop")),
  ];
  let (session, server) = connect(script, false).await;

  let recorder = Recorder::default();
  let ticker = recorder.clone();
  let result = Bot::builder(config())
    .events(recorder.clone())
    .cog(commands())
    .task(move |ctx| async move {
      let period = Duration::from_secs(2);
      let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
      for n in 1..=2 {
        interval.tick().await;
        ticker.push(format!("tick {n}"));
        ctx.send(format!("tick {n}"));
      }
      Ok(())
    })
    .build()
    .run_on(session)
    .await;
  assert!(result.is_ok());

  assert_eq!(
    recorder.events(),
    [
      "ready",
      "run",
      "connect",
      "message hi 1",
      "not addressed hi 1",
      "tick 1",
      "message hi 3",
      "not addressed hi 3",
      "tick 2",
      "message !stop",
      "graceful",
      "terminated",
    ]
  );

  let lines = server.await.unwrap();
  let sent = lines
    .iter()
    .filter(|line| line.starts_with("PRIVMSG"))
    .map(String::as_str)
    .collect::<Vec<_>>();
  assert_eq!(
    sent,
    [
      "PRIVMSG #ch :tick 1",
      "PRIVMSG #ch :tick 2",
      "PRIVMSG #ch :bye"
    ]
  );
}

#[tokio::test]
async fn only_the_command_word_makes_a_chat_message() {
  let resub = "@badge-info=subscriber/3;badges=subscriber/3;display-name=Ann;msg-id=resub;room-id=1;system-msg=Ann\\ssubscribed;user-id=1 :tmi.twitch.tv USERNOTICE #ch :love the PRIVMSG parser\r\n";
  let whisper = ":ann!ann@ann.tmi.twitch.tv WHISPER bot :x PRIVMSG #ch :!ping\r\n";
  let script = vec![
    (Duration::ZERO, resub.to_owned()),
    (Duration::ZERO, whisper.to_owned()),
    (Duration::ZERO, privmsg("!stop")),
  ];
  let (session, server) = connect(script, false).await;

  let recorder = Recorder::default();
  let result = Bot::builder(config())
    .events(recorder.clone())
    .cog(commands())
    .build()
    .run_on(session)
    .await;
  assert!(result.is_ok());

  assert_eq!(
    recorder.events(),
    [
      "ready",
      "run",
      "connect",
      "message !stop",
      "graceful",
      "terminated",
    ]
  );
  let lines = server.await.unwrap();
  assert!(!lines.contains(&"PRIVMSG #ch :pong!".to_owned()));
}

async fn move_to_other(_: Arc<()>, ctx: Context, _: Message) -> Result<(), BotError> {
  ctx.change_room("#Other");
  Ok(())
}

fn fast_backoff() -> Backoff {
  Backoff {
    max_tries: Some(3),
    initial_delay: Duration::from_millis(10),
    delay_multiplier: 2,
    max_delay: Duration::from_millis(50),
  }
}

/// Accepts one connection per script. Each connection is answered like [`serve`],
/// except that its script only starts once the bot has joined a room.
async fn serve_tcp(listener: TcpListener, scripts: Vec<Vec<String>>) -> Vec<Vec<String>> {
  let mut connections = Vec::new();
  for script in scripts {
    let (stream, _) = listener.accept().await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let mut received = Vec::new();
    for _ in 0..4 {
      received.push(lines.next_line().await.unwrap().unwrap());
      if received.len() == 3 {
        writer.write_all(WELCOME.as_bytes()).await.unwrap();
      }
    }
    for line in script {
      writer.write_all(line.as_bytes()).await.unwrap();
    }
    while let Ok(Some(line)) = lines.next_line().await {
      received.push(line);
    }
    connections.push(received);
  }
  connections
}

#[tokio::test]
async fn changes_room_and_reconnects() {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let port = listener.local_addr().unwrap().port();
  let server = tokio::spawn(serve_tcp(
    listener,
    vec![
      vec![privmsg("!move")],
      vec![":tmi.twitch.tv RECONNECT\r\n".to_owned()],
      vec![privmsg("!stop")],
    ],
  ));

  let recorder = Recorder::default();
  let config = config()
    .endpoint(Endpoint::plain("127.0.0.1", port))
    .backoff(fast_backoff());
  let result = Bot::builder(config)
    .events(recorder.clone())
    .cog(
      Cog::builder("!", ())
        .command(Command::new("move", move_to_other))
        .command(Command::new("stop", stop))
        .build(),
    )
    .build()
    .run()
    .await;
  assert!(result.is_ok());

  assert_eq!(
    recorder.events(),
    [
      "ready",
      "run",
      "connect",
      "message !move",
      "executed !move []",
      "connect",
      "connect",
      "message !stop",
      "graceful",
      "terminated",
    ]
  );

  let connections = server.await.unwrap();
  let joins = connections
    .iter()
    .map(|lines| {
      lines
        .iter()
        .filter(|line| line.starts_with("JOIN"))
        .map(String::as_str)
        .collect::<Vec<_>>()
    })
    .collect::<Vec<_>>();
  assert_eq!(joins, [["JOIN #ch"], ["JOIN #other"], ["JOIN #other"]]);
  assert_eq!(connections[2].last().unwrap(), "PRIVMSG #other :bye");
}

#[tokio::test]
async fn reconnect_gives_up_after_backoff() {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let port = listener.local_addr().unwrap().port();
  let server = tokio::spawn(async move {
    let (stream, _) = listener.accept().await.unwrap();
    drop(listener);

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    for _ in 0..3 {
      lines.next_line().await.unwrap();
    }
    writer.write_all(WELCOME.as_bytes()).await.unwrap();
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "JOIN #ch");
    writer
      .write_all(b":tmi.twitch.tv RECONNECT\r\n")
      .await
      .unwrap();
    while let Ok(Some(_)) = lines.next_line().await {}
  });

  let recorder = Recorder::default();
  let config = config()
    .endpoint(Endpoint::plain("127.0.0.1", port))
    .backoff(fast_backoff());
  let result = Bot::builder(config)
    .events(recorder.clone())
    .build()
    .run()
    .await;

  assert!(matches!(
    result,
    Err(BotError::Reconnect(ReconnectError {
      cause: ConnectError::Open(_)
    }))
  ));
  let events = recorder.events();
  assert_eq!(events[..3], ["ready", "run", "connect"]);
  assert!(events[3].starts_with("unexpected: all reconnect attempts failed"));
  assert_eq!(events[4..], ["terminated"]);
  server.await.unwrap();
}

#[cfg(feature = "helix")]
mod followers {
  use super::*;
  use cogbot::Helix;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  type Seen = Mutex<Vec<Option<bool>>>;

  async fn follows(seen: Arc<Seen>, _: Context, msg: Message) -> Result<(), BotError> {
    seen
      .lock()
      .unwrap()
      .push(msg.sender().follows_broadcaster());
    Ok(())
  }

  async fn stop(_: Arc<Seen>, _: Context, _: Message) -> Result<(), BotError> {
    Err(BotError::Exit)
  }

  #[tokio::test]
  async fn sender_follow_status_is_known_before_dispatch() {
    let helix_server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/users/follows"))
      .and(query_param("to_id", "1"))
      .and(query_param("from_id", "1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "total": 1,
        "data": [],
      })))
      .mount(&helix_server)
      .await;

    let without_room = "@badges=;display-name=Bob;id=m2;mod=0;subscriber=0;user-id=2 :bob!bob@bob.tmi.twitch.tv PRIVMSG #ch :!follows\r\n";
    let script = vec![
      (Duration::ZERO, privmsg("!follows")),
      (Duration::ZERO, without_room.to_owned()),
      (Duration::ZERO, privmsg("!stop")),
    ];
    let (session, _server) = connect(script, false).await;

    let cog = Cog::builder("!", Seen::default())
      .command(Command::new("follows", follows))
      .command(Command::new("stop", stop))
      .build();
    let seen = cog.owner().clone();

    let helix = Helix::new("cid", "oauth:token")
      .unwrap()
      .with_base_url(helix_server.uri());
    let result = Bot::builder(config().lookup_followers(true))
      .cog(cog)
      .helix(helix)
      .build()
      .run_on(session)
      .await;
    assert!(result.is_ok());

    assert_eq!(*seen.lock().unwrap(), [Some(true), None]);
    // `!follows` and `!stop` carry a `room-id`, the second `!follows` does not.
    assert_eq!(helix_server.received_requests().await.unwrap().len(), 2);
  }
}
