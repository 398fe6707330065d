#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const SMALL_DELAY: Duration = Duration::from_millis(100);

/// Spawns the daemon on the given ports, waits until the SMTP listener
/// accepts, runs the test body, then tears everything down. Each test uses
/// its own port pair so they can run in parallel.
pub fn pelican_daemon(
    smtp_port: u16,
    http_port: u16,
    fx: impl FnMut(&mut TcpStream, u16) -> Result<()>,
) -> Result<()> {
    run_daemon(smtp_port, http_port, None, fx)
}

/// Same as [`pelican_daemon`], with a TOML configuration file.
pub fn pelican_daemon_with_config(
    smtp_port: u16,
    http_port: u16,
    config: &str,
    fx: impl FnMut(&mut TcpStream, u16) -> Result<()>,
) -> Result<()> {
    let path = std::env::temp_dir().join(format!("pelican-test-{}.toml", smtp_port));
    std::fs::write(&path, config)?;
    let result = run_daemon(smtp_port, http_port, Some(&path), fx);
    let _ = std::fs::remove_file(&path);
    result
}

fn run_daemon(
    smtp_port: u16,
    http_port: u16,
    config: Option<&std::path::Path>,
    mut fx: impl FnMut(&mut TcpStream, u16) -> Result<()>,
) -> Result<()> {
    let smtp_addr = format!("127.0.0.1:{}", smtp_port);

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pelican"));
    cmd.arg("--smtp-bind")
        .arg(&smtp_addr)
        .arg("--http-bind")
        .arg(format!("127.0.0.1:{}", http_port));
    if let Some(path) = config {
        cmd.arg("--config").arg(path);
    }
    let mut daemon = cmd.spawn()?;

    let mut max_retry = 50;
    let mut smtp_socket = loop {
        max_retry -= 1;
        match (TcpStream::connect(&smtp_addr), max_retry) {
            (Err(e), 0) => {
                let _ = daemon.kill();
                bail!("no more retry, last error is: {}", e);
            }
            (Err(_), _) => thread::sleep(SMALL_DELAY),
            (Ok(v), _) => break v,
        }
    };

    // The HTTP listener binds independently of the SMTP one.
    let mut max_retry = 50;
    loop {
        max_retry -= 1;
        match (
            TcpStream::connect(("127.0.0.1", http_port)),
            max_retry,
        ) {
            (Err(e), 0) => {
                let _ = daemon.kill();
                bail!("HTTP port never came up, last error is: {}", e);
            }
            (Err(_), _) => thread::sleep(SMALL_DELAY),
            (Ok(_), _) => break,
        }
    }

    let result = fx(&mut smtp_socket, http_port);

    let _ = smtp_socket.shutdown(Shutdown::Both);
    daemon.kill().context("daemon should be killed")?;

    result.context("all tests passed")
}

/// Reads one SMTP reply, following continuation lines to the final
/// `ddd<SP>` one, and returns the whole thing.
pub fn read_reply(socket: &mut TcpStream) -> Result<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk)?;
        if n == 0 {
            bail!("connection closed while waiting for a reply");
        }
        buffer.extend_from_slice(&chunk[..n]);
        if reply_is_complete(&buffer) {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn reply_is_complete(buffer: &[u8]) -> bool {
    if !buffer.ends_with(b"\r\n") {
        return false;
    }
    let text = String::from_utf8_lossy(buffer);
    match text.lines().last() {
        Some(line) => line.len() >= 4 && line.as_bytes()[3] == b' ',
        None => false,
    }
}

pub fn send_line(socket: &mut TcpStream, line: &str) -> Result<()> {
    socket.write_all(line.as_bytes())?;
    socket.write_all(b"\r\n")?;
    Ok(())
}

/// Sends one line and asserts on the reply code of the answer.
pub fn command(socket: &mut TcpStream, line: &str, expect: u16) -> Result<String> {
    send_line(socket, line)?;
    let reply = read_reply(socket)?;
    if !reply.starts_with(&expect.to_string()) {
        bail!("sent {:?}, expected {}, got {:?}", line, expect, reply);
    }
    Ok(reply)
}

/// Runs one SMTP transaction: MAIL, RCPT, DATA, payload, dot.
/// The payload lines must not be dot-stuffed yet; this does it.
pub fn deliver(socket: &mut TcpStream, payload: &str) -> Result<()> {
    command(socket, "MAIL FROM:<test@localhost>", 250)?;
    command(socket, "RCPT TO:<test@localhost>", 250)?;
    command(socket, "DATA", 354)?;
    for line in payload.split("\r\n") {
        if line.starts_with('.') {
            socket.write_all(b".")?;
        }
        send_line(socket, line)?;
    }
    send_line(socket, ".")?;
    let reply = read_reply(socket)?;
    if !reply.starts_with("250") {
        bail!("DATA was not accepted: {:?}", reply);
    }
    Ok(())
}

pub fn auth_plain(socket: &mut TcpStream, username: &str, password: &str) -> Result<String> {
    use base64::Engine;
    let b64 = base64::engine::general_purpose::STANDARD
        .encode(format!("\0{}\0{}", username, password));
    send_line(socket, &format!("AUTH PLAIN {}", b64))?;
    read_reply(socket)
}

/// Minimal HTTP/1.1 client over a raw socket; returns status code and body.
pub fn http_request(
    http_port: u16,
    method: &str,
    path_and_query: &str,
    body: &str,
) -> Result<(u16, String)> {
    let mut socket = TcpStream::connect(("127.0.0.1", http_port))?;
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        method,
        path_and_query,
        body.len(),
        body
    );
    socket.write_all(request.as_bytes())?;

    let mut response = Vec::new();
    socket.read_to_end(&mut response)?;
    let text = String::from_utf8_lossy(&response).into_owned();

    let (head, payload) = match text.split_once("\r\n\r\n") {
        Some(v) => v,
        None => bail!("malformed HTTP response: {:?}", text),
    };
    let status: u16 = head
        .split_whitespace()
        .nth(1)
        .context("missing status code")?
        .parse()?;

    Ok((status, payload.to_string()))
}

pub fn http_get_json(http_port: u16, path_and_query: &str) -> Result<serde_json::Value> {
    let (status, body) = http_request(http_port, "GET", path_and_query, "")?;
    if status != 200 {
        bail!("GET {} returned {}", path_and_query, status);
    }
    Ok(serde_json::from_str(&body)?)
}
