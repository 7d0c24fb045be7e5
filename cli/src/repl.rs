/*
 * This file is a part of Skytable
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use crate::args::ClientConfig;
use crate::client::Connection;
use crate::error::CliResult;
use kilncore::util::terminal;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const HISTORY_FILE: &str = ".kiln_history";
const TXT_WELCOME: &str = "kiln shell. Type a command and press enter; `exit` to quit, `clear` to clear the screen.";

pub fn start(cfg: ClientConfig) -> CliResult<()> {
    let mut con = Connection::connect(&cfg.host, cfg.port)?;

    let mut editor = DefaultEditor::new().map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let had_history = editor.load_history(HISTORY_FILE).is_ok();
    if !had_history {
        println!("{TXT_WELCOME}");
    }

    loop {
        match editor.readline(&format!("{}:{}> ", cfg.host, cfg.port)) {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                match line.trim() {
                    "" => continue,
                    "exit" => break,
                    "!help" => println!("{TXT_WELCOME}"),
                    "clear" => clear_screen(),
                    _ => match con.execute(&line) {
                        Ok(reply) => {
                            if reply.starts_with('-') {
                                let _ = terminal::write_error(format_args!("{reply}\n"));
                            } else {
                                println!("{reply}");
                            }
                        }
                        Err(e) => {
                            let _ = terminal::write_error(format_args!("connection error: {e}\n"));
                            break;
                        }
                    },
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                let _ = terminal::write_error(format_args!("readline error: {e}\n"));
                break;
            }
        }
    }
    let _ = editor.save_history(HISTORY_FILE);
    println!("Goodbye!");
    Ok(())
}

fn clear_screen() {
    print!("\x1B[2J\x1B[1;1H");
    let _ = std::io::Write::flush(&mut std::io::stdout());
}
