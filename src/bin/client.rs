use std::io::{self, BufRead, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;

use salotto::client::{ClientSm, ClientState};
use salotto::common;
use salotto::protocol::{ClientRequest, ServerMsg};
use salotto::transport;

fn prompt(text: &str) -> io::Result<String> {
    print!("{}", text);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn send(stream: &mut TcpStream, req: &ClientRequest) -> Result<(), Box<dyn std::error::Error>> {
    let payload = req.to_wire()?;
    transport::send_frame(stream, &payload)?;
    Ok(())
}

fn show_help() {
    println!("\n📚 Available commands:");
    println!("  c <user>        - Start chatting with a user");
    println!("  bye             - Leave the current chat");
    println!("  @<user> <text>  - Send a private message");
    println!("  who             - List online users");
    println!("  time            - Ask the server for the time");
    println!("  ? <term>        - Search your message history");
    println!("  p <number>      - Fetch a sonnet by number");
    println!("  ttt <user>      - Challenge a user to Tic-Tac-Toe");
    println!("  move <row> <col>- Play a move (0-2)");
    println!("  /setpfp <URL>   - Set your profile picture");
    println!("  q               - Quit");
    println!();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("🚀 Welcome to Salotto Chat!");
    println!("Type /help for available commands.");

    let addr = {
        let typed = prompt(&format!("Server address [{}]: ", common::DEFAULT_ADDR))?;
        if typed.is_empty() {
            common::DEFAULT_ADDR.to_string()
        } else {
            typed
        }
    };
    let mut stream = TcpStream::connect(&addr)?;
    println!("✅ Connected to {}", addr);

    let sm = Arc::new(Mutex::new(ClientSm::new()));

    // Login is a synchronous request/reply exchange before the reader thread
    // takes over the socket.
    loop {
        let name = prompt("Pick a name: ")?;
        if name.is_empty() {
            continue;
        }
        let req = {
            let mut sm = sm.lock().map_err(|_| "client state poisoned")?;
            sm.login(&name)
        };
        send(&mut stream, &req)?;
        let reply = match transport::recv_frame(&mut stream)? {
            Some(payload) => payload,
            None => {
                println!("❌ Server closed the connection.");
                return Ok(());
            }
        };
        let msg = ServerMsg::from_wire(&reply)?;
        let (lines, done) = {
            let mut sm = sm.lock().map_err(|_| "client state poisoned")?;
            (sm.handle_server(msg), sm.state() == ClientState::LoggedIn)
        };
        for line in lines {
            println!("{}", line);
        }
        if done {
            break;
        }
    }

    // Pushed messages arrive at any time, so a dedicated thread drains the
    // socket while the main thread owns stdin.
    let reader_sm = Arc::clone(&sm);
    let mut reader_stream = stream.try_clone()?;
    thread::spawn(move || loop {
        match transport::recv_frame(&mut reader_stream) {
            Ok(Some(payload)) => match ServerMsg::from_wire(&payload) {
                Ok(msg) => {
                    if let Ok(mut sm) = reader_sm.lock() {
                        for line in sm.handle_server(msg) {
                            println!("{}", line);
                        }
                    }
                }
                Err(e) => eprintln!("❌ Bad message from server: {}", e),
            },
            Ok(None) => {
                println!("👋 Server closed the connection.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Connection error: {}", e);
                std::process::exit(1);
            }
        }
    });

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim() == "/help" {
            show_help();
            continue;
        }
        let reaction = {
            let mut sm = sm.lock().map_err(|_| "client state poisoned")?;
            sm.handle_command(&line)
        };
        for out in reaction.output {
            println!("{}", out);
        }
        if let Some(req) = reaction.request {
            send(&mut stream, &req)?;
        }
        if reaction.quit {
            break;
        }
    }

    Ok(())
}
