/// Format one protocol line into the session's scratch buffer, then write and flush it.
///
/// The `\r\n` is appended automatically. Must be used inside an `async` fn.
macro_rules! write_line {
  ($session:ident, $($arg:tt)*) => {{
    use ::std::fmt::Write as _;
    use ::tokio::io::AsyncWriteExt as _;
    let mut scratch = ::std::mem::take(&mut $session.scratch);
    let _ = write!(&mut scratch, $($arg)*);
    scratch.push_str("\r\n");
    let mut result = $session.writer.write_all(scratch.as_bytes()).await;
    if result.is_ok() {
      result = $session.writer.flush().await;
    }
    scratch.clear();
    $session.scratch = scratch;
    result
  }};
}
