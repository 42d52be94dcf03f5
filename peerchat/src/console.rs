//! Interactive menu. Turns typed input into node intents and prints engine events while it
//! waits for the next line.

use std::io::Write;

use peerchat_core::{EngineError, Event, PeerAddress};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::node::Node;

const MENU: &str = "
***** Menu *****
1. Send message
2. Query active peers
3. Connect to a peer
4. Accept a connection request
5. Disconnect from a peer
6. Query pending connection requests
7. Reject a connection request
8. Ask connected peers who is online
9. Announce to connected peers
10. Cancel an outgoing connection request
0. Quit";

pub struct Console<R> {
    lines: Lines<R>,
    events: Option<UnboundedReceiver<Event>>,
}

impl Console<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> Console<R> {
    pub fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
            events: None,
        }
    }

    /// Ask for a display name until one fits on the wire. `None` on end of input.
    pub async fn prompt_name(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let Some(line) = self.prompt("Enter your name: ").await? else {
                return Ok(None);
            };
            let name = line.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                println!("Name must be a single word.");
                continue;
            }
            return Ok(Some(name.to_string()));
        }
    }

    /// Run the menu until the user quits or input ends.
    pub async fn run(
        &mut self,
        node: &Node,
        events: UnboundedReceiver<Event>,
    ) -> std::io::Result<()> {
        self.events = Some(events);
        loop {
            println!("{MENU}");
            let Some(choice) = self.prompt("Enter choice: ").await? else {
                return Ok(());
            };
            match choice.trim() {
                "1" => self.send_message(node).await?,
                "2" => print_table(
                    "Connected Peers:",
                    "No connected peers.",
                    &node.engine().directory().list_connected(),
                ),
                "3" => {
                    if let Some(peer) = self.ask_peer().await? {
                        match node.connect(&peer) {
                            Ok(()) => println!("Sent connection request to {peer}"),
                            Err(e) => report(e),
                        }
                    }
                }
                "4" => {
                    if let Some(peer) = self.ask_peer().await? {
                        match node.accept(&peer) {
                            Ok(()) => println!("Accepted connection with {peer}"),
                            Err(e) => report(e),
                        }
                    }
                }
                "5" => {
                    if let Some(peer) = self.ask_peer().await? {
                        match node.disconnect(&peer) {
                            Ok(()) => println!("Sent disconnection request to {peer}"),
                            Err(e) => report(e),
                        }
                    }
                }
                "6" => print_table(
                    "Pending Connection Requests:",
                    "No pending connection requests.",
                    &node.engine().directory().list_pending(),
                ),
                "7" => {
                    if let Some(peer) = self.ask_peer().await? {
                        match node.reject(&peer) {
                            Ok(name) => println!("Rejected request from {peer} ({name})"),
                            Err(e) => report(e),
                        }
                    }
                }
                "8" => println!("Asked {} peer(s) who is online.", node.discover()),
                "9" => println!("Announced to {} peer(s).", node.announce()),
                "10" => {
                    if let Some(peer) = self.ask_peer().await? {
                        match node.cancel_connect(&peer) {
                            Ok(()) => println!("Cancelled connection request to {peer}"),
                            Err(e) => report(e),
                        }
                    }
                }
                "0" => {
                    println!("Exiting...");
                    return Ok(());
                }
                _ => println!("Invalid choice, try again."),
            }
        }
    }

    async fn send_message(&mut self, node: &Node) -> std::io::Result<()> {
        let Some(peer) = self.ask_peer().await? else {
            return Ok(());
        };
        let Some(body) = self.prompt("Enter your message: ").await? else {
            return Ok(());
        };
        match node.send_chat(&peer, &body) {
            Ok(()) => println!("Message sent to {peer}"),
            Err(e) => report(e),
        }
        Ok(())
    }

    /// Read an IP and a port. Prints the problem and returns `None` on bad input.
    async fn ask_peer(&mut self) -> std::io::Result<Option<PeerAddress>> {
        let Some(host) = self.prompt("Enter peer IP: ").await? else {
            return Ok(None);
        };
        let Some(port) = self.prompt("Enter peer port: ").await? else {
            return Ok(None);
        };
        match PeerAddress::from_parts(&host, &port) {
            Ok(addr) => Ok(Some(addr)),
            Err(e) => {
                println!("Invalid peer address: {e}");
                Ok(None)
            }
        }
    }

    async fn prompt(&mut self, label: &str) -> std::io::Result<Option<String>> {
        show_prompt(label);
        loop {
            tokio::select! {
                line = self.lines.next_line() => return line,
                Some(event) = next_event(&mut self.events) => {
                    println!("\n{event}");
                    show_prompt(label);
                }
            }
        }
    }
}

async fn next_event(events: &mut Option<UnboundedReceiver<Event>>) -> Option<Event> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn show_prompt(label: &str) {
    print!("{label}");
    let _ = std::io::stdout().flush();
}

fn print_table(title: &str, empty: &str, rows: &[(PeerAddress, String)]) {
    if rows.is_empty() {
        println!("{empty}");
        return;
    }
    println!("{title}");
    for (addr, name) in rows {
        println!("{addr} ({name})");
    }
}

fn report(e: EngineError) {
    match e {
        EngineError::NoPendingRequest(_) => println!("No connection request from this peer."),
        EngineError::AlreadyPending(_) => {
            println!("Connection request already pending for this peer.")
        }
        EngineError::NoOutgoingRequest(_) => {
            println!("No outgoing connection request to this peer.")
        }
        EngineError::NotConnected(_) => println!("Peer not connected."),
        EngineError::EmptyMessage => println!("Message is empty, nothing sent."),
    }
}
