use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::{bail, eyre};
use crossterm::event::{Event, EventStream, KeyCode, KeyModifiers};
use ratatui::{DefaultTerminal, Frame};
use tokio_stream::StreamExt;

use tablemate::{
    aws,
    config::Config,
    logging::{self, LogTarget},
    remote::{DynamoTableService, MemoryTableService, RemoteTableService},
    table::{Row, SortSpec, TableManager, TableSchema},
};

mod subcommands;
mod util;
mod widgets;

use widgets::{TableView, theme::Theme};

#[derive(clap::Parser)]
#[command(
    name = "tablemate",
    version,
    about = "Browse and edit small reference tables",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v, -vv, etc.)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Endpoint URL for the DynamoDB service
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// Table to open
    #[arg(short, long, global = true, default_value = "brands")]
    table: String,

    /// Rows per page
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    page_size: Option<u64>,

    /// Use an in-memory table seeded with sample rows instead of DynamoDB
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create the DynamoDB table, keyed by a numeric id
    InitTable,
    /// Print one page of rows
    ListRows {
        /// 1-based page number
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        page: u64,
        /// Sort as field[:asc|desc]
        #[arg(long)]
        sort: Option<SortSpec>,
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },
    /// Create a row from field=value pairs
    CreateRow {
        #[arg(value_parser = subcommands::parse_assignment)]
        values: Vec<(String, String)>,
        #[arg(short, long)]
        json: bool,
    },
    /// Change fields of an existing row
    UpdateRow {
        id: i64,
        #[arg(value_parser = subcommands::parse_assignment)]
        values: Vec<(String, String)>,
        #[arg(short, long)]
        json: bool,
    },
    /// Delete a row by id
    DeleteRow { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| eyre!("failed to install aws-lc-rs crypto provider"))?;

    color_eyre::install()?;
    let cli = <Cli as clap::Parser>::parse();

    let log_path = logging::default_log_path();
    match (&cli.command, log_path.as_deref()) {
        // the TUI owns the terminal, so logs go to a file
        (None, Some(path)) => logging::init(cli.verbose, LogTarget::File(path))?,
        (None, None) => {}
        (Some(_), _) => logging::init(cli.verbose, LogTarget::Stderr)?,
    }

    let config = Config::load(cli.config.as_deref())?;
    let mut schema = config.table(&cli.table)?;
    if let Some(size) = cli.page_size {
        schema.page_size = usize::try_from(size)?;
    }
    let endpoint_url = cli.endpoint_url.clone().or(config.endpoint_url.clone());

    if let Some(Commands::InitTable) = cli.command {
        if cli.memory {
            bail!("init-table needs DynamoDB; drop --memory");
        }
        let client = aws::new_client(endpoint_url.as_deref()).await?;
        let options = subcommands::init_table::Options {
            table_name: schema.name.clone(),
        };
        return subcommands::init_table::command(&client, options).await;
    }

    let service: Arc<dyn RemoteTableService> = if cli.memory {
        Arc::new(
            MemoryTableService::new(&schema.name, schema.default_sort.clone())
                .with_rows(sample_rows(&schema)),
        )
    } else {
        let client = aws::new_client(endpoint_url.as_deref()).await?;
        aws::validate_table(&client, &schema.name).await?;
        Arc::new(DynamoTableService::new(
            client,
            &schema.name,
            schema.default_sort.clone(),
        ))
    };
    let mut manager = TableManager::new(schema, service, config.staleness_window);

    match cli.command {
        Some(Commands::ListRows { page, sort, json }) => {
            let options = subcommands::list_rows::Options {
                page: usize::try_from(page)?,
                sort,
                json,
            };
            subcommands::list_rows::command(&mut manager, options).await
        }
        Some(Commands::CreateRow { values, json }) => {
            let options = subcommands::create_row::Options { values, json };
            subcommands::create_row::command(&mut manager, options).await
        }
        Some(Commands::UpdateRow { id, values, json }) => {
            let options = subcommands::update_row::Options { id, values, json };
            subcommands::update_row::command(&mut manager, options).await
        }
        Some(Commands::DeleteRow { id }) => {
            let options = subcommands::delete_row::Options { id };
            subcommands::delete_row::command(&mut manager, options).await
        }
        Some(Commands::InitTable) => Ok(()),
        None => {
            let result = App::new(manager).run_tui().await;
            if let Some(path) = log_path {
                eprintln!("Logs: {}", util::abbreviate_home(&path));
            }
            result
        }
    }
}

/// Rows for `--memory`, so the UI has something to page through.
fn sample_rows(schema: &TableSchema) -> Vec<Row> {
    const BRANDS: &[(&str, &str)] = &[
        ("Alfa Romeo", "Italy"),
        ("Aston Martin", "United Kingdom"),
        ("BMW", "Germany"),
        ("Bugatti", "France"),
        ("Citroën", "France"),
        ("Ferrari", "Italy"),
        ("Ford", "United States"),
        ("Honda", "Japan"),
        ("Lamborghini", "Italy"),
        ("Mazda", "Japan"),
        ("McLaren", "United Kingdom"),
        ("Porsche", "Germany"),
    ];
    const MODELS: &[(&str, i64)] = &[
        ("Giulia", 1),
        ("DB5", 2),
        ("M3", 3),
        ("Chiron", 4),
        ("DS", 5),
        ("F40", 6),
        ("Mustang", 7),
        ("NSX", 8),
        ("Miura", 9),
        ("MX-5", 10),
        ("F1", 11),
        ("911", 12),
        ("Countach", 9),
    ];
    match schema.name.as_str() {
        "brands" => BRANDS
            .iter()
            .zip(1..)
            .map(|((name, country), id)| Row::new(id).with("name", *name).with("country", *country))
            .collect(),
        "models" => MODELS
            .iter()
            .zip(1..)
            .map(|((name, brand_id), id)| {
                Row::new(id).with("name", *name).with("brand_id", *brand_id)
            })
            .collect(),
        _ => Vec::new(),
    }
}

struct App {
    should_quit: bool,
    view: TableView,
    theme: Theme,
}

impl App {
    const FRAMES_PER_SECOND: f32 = 30.0;

    fn new(manager: TableManager) -> Self {
        Self {
            should_quit: false,
            view: TableView::new(manager),
            theme: Theme::detect(),
        }
    }

    async fn run_tui(self) -> Result<()> {
        let terminal = ratatui::init();
        let app_result = self.run(terminal).await;
        ratatui::restore();
        app_result
    }

    async fn run(mut self, mut terminal: DefaultTerminal) -> Result<()> {
        self.view.start();

        let period = Duration::from_secs_f32(1.0 / Self::FRAMES_PER_SECOND);
        let mut interval = tokio::time::interval(period);
        let mut events = EventStream::new();

        while !self.should_quit {
            tokio::select! {
                _ = interval.tick() => { terminal.draw(|frame| self.render(frame))?; },
                Some(Ok(event)) = events.next() => self.handle_event(&event),
                Some(event) = self.view.next_event() => self.view.handle_table_event(event),
            }
        }
        Ok(())
    }

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        util::fill_bg(frame.buffer_mut(), area, self.theme.backdrop());
        self.view.render(frame, area, &self.theme);
    }

    fn handle_event(&mut self, event: &Event) {
        if let Some(key) = event.as_key_press_event()
            && key.code == KeyCode::Char('c')
            && key.modifiers.contains(KeyModifiers::CONTROL)
        {
            self.should_quit = true;
            return;
        }
        if self.view.handle_event(event) {
            return;
        }
        if let Some(key) = event.as_key_press_event() {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablemate::table::Scalar;

    #[test]
    fn sample_rows_match_their_schema() {
        for schema in TableSchema::builtin() {
            let rows = sample_rows(&schema);
            assert!(rows.len() > schema.page_size, "{} fits on one page", schema.name);
            for row in rows {
                for field in &schema.fields {
                    assert!(row.get(&field.name).is_some(), "{} missing {}", row.id, field.name);
                }
            }
        }
        let first_model = &sample_rows(&TableSchema::models())[0];
        assert_eq!(first_model.get("brand_id"), Some(&Scalar::Int(1)));
    }

    #[test]
    fn cli_parses_assignments_and_sort() {
        let cli = <Cli as clap::Parser>::try_parse_from([
            "tablemate",
            "--memory",
            "update-row",
            "3",
            "name=Zonda",
            "country=Italy",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::UpdateRow { id, values, .. }) => {
                assert_eq!(id, 3);
                assert_eq!(values[0], ("name".to_string(), "Zonda".to_string()));
            }
            _ => panic!("expected update-row"),
        }

        let args = ["tablemate", "list-rows", "--sort", "country:desc"];
        let cli = <Cli as clap::Parser>::try_parse_from(args).unwrap();
        match cli.command {
            Some(Commands::ListRows { sort, page, .. }) => {
                assert_eq!(sort, Some(SortSpec::desc("country")));
                assert_eq!(page, 1);
            }
            _ => panic!("expected list-rows"),
        }

        assert!(<Cli as clap::Parser>::try_parse_from(["tablemate", "--page-size", "0"]).is_err());
    }
}
