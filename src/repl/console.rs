use super::{buffer, prompt, status};
use crate::engine::Engine;
use crate::errors;
use crate::executor::{self, ExecOutput};
use crate::sql::parser::Parser;
use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal,
};
use std::io::{self, Write};
use std::sync::Once;
use std::time::Instant;
use tracing::info;

static INIT: Once = Once::new();

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

const BANNER: &str = r#"
Commands end with ';'. Meta-commands start with '.'; type '.help' for a list.
"#;

const HELP: &str = r#"Meta-commands:
.exit                 leave the REPL
.help                 show this text
.schema               list tables and their columns
.indexes [table]      list secondary indexes
.constants            print B+tree layout constants
.btree [table]        print the B+tree structure of a table
.stats                print query planner statistics
.checkpoint           flush the WAL and truncate it
.begin / .commit      mark a transaction boundary in the WAL

Anything else ending in ';' is parsed and executed as SQL."#;

/// Starts the REPL in raw console mode against the database at `path`.
pub fn start(engine: &mut Engine) -> Result<(), errors::Error> {
    info!(path = %engine.base_path.display(), "starting REPL session");
    terminal::enable_raw_mode()?;
    execute!(io::stdout(), cursor::EnableBlinking)?;

    INIT.call_once(|| {
        std::panic::set_hook(Box::new(|_| {
            let _ = terminal::disable_raw_mode();
        }));
    });

    let mut console = Console::new(engine);
    let result = console.start();

    terminal::disable_raw_mode()?;
    result
}

struct Console<'a> {
    engine: &'a mut Engine,
    status: status::StatusBar,
}

impl<'a> Console<'a> {
    fn new(engine: &'a mut Engine) -> Self {
        Console { engine, status: status::StatusBar::new() }
    }

    fn start(&mut self) -> Result<(), errors::Error> {
        echo(format!("{} {} REPL.\n", NAME, VERSION))?;
        echo_lines(format!("{}\n", BANNER))?;

        let dbname = self.engine.base_path.display().to_string();

        let mut continue_prompt = false;
        let mut buffer = buffer::Buffer::new();
        let mut prompt = prompt::Prompt::new();

        loop {
            if !continue_prompt {
                buffer.clear();
                prompt.start_prompt()?;
            }
            buffer.newline();
            continue_prompt = false;

            self.status.update(
                Some(dbname.clone()),
                Some(prompt.x),
                Some(prompt.y),
                Some(buffer.len_total()),
            );
            self.status.draw()?;
            prompt.readline(&mut buffer, &mut self.status)?;
            let input = buffer.build();

            match input.as_str() {
                ".exit" | "exit" | "quit" => {
                    prompt.append_line(&input);
                    echo("\nBye\n".into())?;
                    break;
                }
                ".help" => {
                    prompt.append_line(&input);
                    echo_lines(format!("{}\n", HELP))?;
                }
                cmd if cmd.starts_with('.') => {
                    prompt.append_line(&input);
                    self.run_meta_command(cmd)?;
                }
                cmd => {
                    if cmd.is_empty() {
                        continue;
                    }
                    if cmd.ends_with(';') {
                        prompt.append_line(&input);
                        self.run_sql(cmd);
                        continue_prompt = false;
                    } else {
                        prompt.continue_prompt()?;
                        continue_prompt = true;
                    }
                }
            }
        }

        Ok(())
    }

    fn run_sql(&mut self, cmd: &str) {
        let statement = match Parser::parse(cmd) {
            Ok(s) => s,
            Err(e) => {
                let _ = echo_error(format!("{}\n", e));
                return;
            }
        };

        let start = Instant::now();
        match executor::execute(self.engine, statement) {
            Ok(ExecOutput::Executed) => {
                let elapsed = start.elapsed().as_secs_f32();
                let _ = echo(format!("Executed. ({:.3}s)\n", elapsed));
            }
            Ok(ExecOutput::Rows(rows)) => {
                let elapsed = start.elapsed().as_secs_f32();
                for row in &rows {
                    let _ = echo(format!("{}\n", row));
                }
                let _ = echo(format!("({} rows, {:.3}s)\n", rows.len(), elapsed));
            }
            Ok(ExecOutput::Plan(plan)) => {
                let _ = echo_lines(format!("{}\n", plan));
            }
            Err(e) => {
                let _ = echo_error(format!("{}\n", e));
            }
        }
    }

    fn run_meta_command(&mut self, cmd: &str) -> io::Result<()> {
        let mut parts = cmd.trim_end_matches(';').split_whitespace();
        let head = parts.next().unwrap_or("");
        let arg = parts.next();

        match head {
            ".schema" => {
                let mut names = self.engine.schema.table_names();
                names.sort();
                for name in names {
                    if let Ok(table) = self.engine.schema.get_table(&name) {
                        let cols: Vec<String> = table
                            .columns
                            .iter()
                            .map(|c| format!("{} {:?}", c.name, c.col_type))
                            .collect();
                        echo(format!("{}({})\n", name, cols.join(", ")))?;
                    }
                }
            }
            ".indexes" => {
                let tables = match arg {
                    Some(t) => vec![t.to_string()],
                    None => self.engine.schema.table_names(),
                };
                for table in tables {
                    let names = self.engine.indexes.index_names(&table);
                    if names.is_empty() {
                        echo(format!("{}: (none)\n", table))?;
                    } else {
                        echo(format!("{}: {}\n", table, names.join(", ")))?;
                    }
                }
            }
            ".constants" => {
                let table_name = arg.unwrap_or("users");
                match self.engine.tables.get_mut(table_name) {
                    Ok(table) => {
                        let c = table.constants();
                        echo(format!(
                            "ROW_SIZE: {}\nCOMMON_NODE_HEADER_SIZE: {}\nLEAF_NODE_HEADER_SIZE: {}\nLEAF_NODE_CELL_SIZE: {}\nLEAF_NODE_SPACE_FOR_CELLS: {}\nLEAF_NODE_MAX_CELLS: {}\n",
                            c.row_size,
                            c.common_node_header_size,
                            c.leaf_node_header_size,
                            c.leaf_node_cell_size,
                            c.leaf_node_space_for_cells,
                            c.leaf_node_max_cells,
                        ))?;
                    }
                    Err(e) => echo_error(format!("{}\n", e))?,
                }
            }
            ".btree" => {
                let table_name = arg.unwrap_or("users");
                match self.engine.tables.get_mut(table_name) {
                    Ok(table) => {
                        let root = table.root_page_num;
                        match table.print_tree(root, 0) {
                            Ok(lines) => echo_lines(format!("{}\n", lines.join("\n")))?,
                            Err(e) => echo_error(format!("{}\n", e))?,
                        }
                    }
                    Err(e) => echo_error(format!("{}\n", e))?,
                }
            }
            ".stats" => {
                let s = &self.engine.stats;
                echo(format!(
                    "full_scans: {}\nindex_searches: {}\nrows_scanned: {}\nrows_returned: {}\n",
                    s.full_scans, s.index_searches, s.rows_scanned, s.rows_returned,
                ))?;
            }
            ".checkpoint" => match self.engine.checkpoint() {
                Ok(()) => echo("Checkpointed.\n".into())?,
                Err(e) => echo_error(format!("{}\n", e))?,
            },
            ".begin" => echo("Transaction started (WAL-tracked only; no nested savepoints).\n".into())?,
            ".commit" => echo("Transaction committed.\n".into())?,
            other => {
                echo_error(format!("Unrecognized meta-command: {}\n", other))?;
                echo_lines(format!("{}\n", HELP))?;
            }
        }
        Ok(())
    }
}

pub fn echo(s: String) -> io::Result<()> {
    let row = scroll_maybe(2)? + 1;
    execute!(
        io::stdout(),
        cursor::MoveTo(0, row),
        terminal::Clear(terminal::ClearType::UntilNewLine),
        Print(s)
    )?;
    io::stdout().flush()
}

pub fn echo_error(s: String) -> io::Result<()> {
    let row = scroll_maybe(2)? + 1;
    execute!(
        io::stdout(),
        cursor::MoveTo(0, row),
        terminal::Clear(terminal::ClearType::UntilNewLine),
        SetForegroundColor(Color::Red),
        Print(s),
        ResetColor,
    )?;
    io::stdout().flush()
}

pub fn echo_lines(s: String) -> io::Result<()> {
    for l in s.lines() {
        let row = scroll_maybe(2)? + 1;
        execute!(
            io::stdout(),
            cursor::MoveTo(0, row),
            terminal::Clear(terminal::ClearType::UntilNewLine),
            Print(l)
        )?;
    }
    io::stdout().flush()
}

pub fn scroll_maybe(reserved_lines: u16) -> io::Result<u16> {
    let (_, y) = cursor::position()?;
    let (_, height) = terminal::size()?;
    let dest = y + reserved_lines;
    if dest >= height {
        let mut to_scroll = dest - height;
        if to_scroll == 0 {
            to_scroll = 1;
        }
        execute!(io::stdout(), terminal::ScrollUp(to_scroll))?;
        return Ok(y - to_scroll);
    }
    Ok(y)
}
