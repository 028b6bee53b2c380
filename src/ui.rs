use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use opsboard::dashboard::{format_money, format_percent};
use opsboard::{
    build_dashboard, pl_report, unit_economics, DashboardSummary, MonthlyStore, PlReport,
    UnitEconomicsRow, RUNWAY_UNBOUNDED,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Regions,
    ProfitLoss,
    UnitEconomics,
}

impl Page {
    pub const ALL: [Page; 4] = [
        Page::Dashboard,
        Page::Regions,
        Page::ProfitLoss,
        Page::UnitEconomics,
    ];

    pub fn next(&self) -> Self {
        match self {
            Page::Dashboard => Page::Regions,
            Page::Regions => Page::ProfitLoss,
            Page::ProfitLoss => Page::UnitEconomics,
            Page::UnitEconomics => Page::Dashboard,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Dashboard => Page::UnitEconomics,
            Page::Regions => Page::Dashboard,
            Page::ProfitLoss => Page::Regions,
            Page::UnitEconomics => Page::ProfitLoss,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Regions => "Regions",
            Page::ProfitLoss => "P&L",
            Page::UnitEconomics => "Unit Economics",
        }
    }
}

pub struct App {
    pub dashboard: Option<DashboardSummary>,
    pub pl: PlReport,
    pub unit: Vec<UnitEconomicsRow>,
    pub current_page: Page,
    pub state: TableState,
}

impl App {
    pub fn load(store: &dyn MonthlyStore) -> Result<Self> {
        Ok(Self::new(
            build_dashboard(store)?,
            pl_report(store)?,
            unit_economics(store)?,
        ))
    }

    pub fn new(dashboard: Option<DashboardSummary>, pl: PlReport, unit: Vec<UnitEconomicsRow>) -> Self {
        let mut state = TableState::default();
        state.select(Some(0));

        Self {
            dashboard,
            pl,
            unit,
            current_page: Page::Dashboard,
            state,
        }
    }

    /// Rows in the table shown on the current page
    pub fn row_count(&self) -> usize {
        match self.current_page {
            Page::Dashboard => 0,
            Page::Regions => self
                .dashboard
                .as_ref()
                .map(|d| d.revenue_by_region.len())
                .unwrap_or(0),
            Page::ProfitLoss => self.pl.rows.len(),
            Page::UnitEconomics => self.unit.len(),
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        self.state.select(Some(0));
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
        self.state.select(Some(0));
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char(c @ '1'..='4') => {
                    let index = c as usize - '1' as usize;
                    app.current_page = Page::ALL[index];
                    app.state.select(Some(0));
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Dashboard => render_dashboard(f, chunks[1], app),
        Page::Regions => render_regions(f, chunks[1], app),
        Page::ProfitLoss => render_pl(f, chunks[1], app),
        Page::UnitEconomics => render_unit_economics(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2]);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in Page::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(format!("{} {}", i + 1, page.title()), style));
    }

    if let Some(dashboard) = &app.dashboard {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled(
            dashboard.period.name.clone(),
            Style::default().fg(Color::White),
        ));
        tab_spans.push(Span::raw("  |  MRR "));
        tab_spans.push(Span::styled(
            format_money(dashboard.revenue),
            Style::default().fg(Color::Green),
        ));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn signed_color(value: f64) -> Color {
    if value >= 0.0 {
        Color::Green
    } else {
        Color::Red
    }
}

fn kpi_line(label: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::raw(format!("  {:<18}", label)),
        Span::styled(value, Style::default().fg(color).add_modifier(Modifier::BOLD)),
    ])
}

fn render_dashboard(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(" Dashboard ");

    let d = match &app.dashboard {
        Some(d) => d,
        None => {
            let empty = Paragraph::new(vec![
                Line::from(""),
                Line::from("  No data yet. Run `opsboard seed` or `opsboard import <path>`."),
            ])
            .block(block);
            f.render_widget(empty, area);
            return;
        }
    };

    let m = &d.metrics;
    let runway = if m.runway_months >= RUNWAY_UNBOUNDED {
        "∞".to_string()
    } else {
        format!("{} months", m.runway_months)
    };
    let runway_color = match m.runway_months {
        r if r > 12 => Color::Green,
        r if r > 6 => Color::Yellow,
        _ => Color::Red,
    };

    let content = vec![
        Line::from(""),
        kpi_line("MRR", format_money(d.revenue), Color::White),
        kpi_line("MoM growth", format_percent(m.mom_growth_pct), signed_color(m.mom_growth_pct)),
        kpi_line("Profit", format_money(d.profit), signed_color(d.profit)),
        kpi_line("Margin", format_percent(d.margin_pct), signed_color(d.margin_pct)),
        Line::from(""),
        kpi_line("Active clients", d.active_clients.to_string(), Color::White),
        kpi_line("New clients", d.new_clients.to_string(), Color::White),
        kpi_line("Churn rate", format_percent(m.churn_rate_pct), Color::White),
        kpi_line("ARPU", format_money(m.arpu), Color::White),
        kpi_line("CAC", format_money(m.cac), Color::White),
        kpi_line("LTV", format_money(m.ltv), Color::White),
        kpi_line(
            "LTV/CAC",
            format!("{:.1}x", m.ltv_cac_ratio),
            if m.ltv_cac_ratio >= 3.0 { Color::Green } else { Color::Yellow },
        ),
        Line::from(""),
        kpi_line("Cash", format_money(d.cash_balance), Color::White),
        kpi_line("Runway", runway, runway_color),
    ];

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn render_table<'a>(f: &mut Frame, area: Rect, state: &mut TableState, table: Table<'a>, title: &'a str) {
    let table = table
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(title),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, state);
}

fn render_regions(f: &mut Frame, area: Rect, app: &mut App) {
    let (regions, total) = match &app.dashboard {
        Some(d) => (d.revenue_by_region.clone(), d.revenue),
        None => (Vec::new(), 0.0),
    };

    let rows = regions.iter().map(|r| {
        let share = if total > 0.0 { r.revenue / total * 100.0 } else { 0.0 };
        Row::new(vec![
            Cell::from(r.code.to_uppercase()),
            Cell::from(r.name.clone()),
            Cell::from(format_money(r.revenue)),
            Cell::from(format_percent(share)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(20),
            Constraint::Length(14),
            Constraint::Length(10),
        ],
    )
    .header(header_row(&["Code", "Region", "MRR", "Share"]));

    render_table(f, area, &mut app.state, table, " Revenue by Region ");
}

fn render_pl(f: &mut Frame, area: Rect, app: &mut App) {
    let mut rows: Vec<Row> = app
        .pl
        .rows
        .iter()
        .map(|p| {
            Row::new(vec![
                Cell::from(p.period.name.clone()),
                Cell::from(format_money(p.total_revenue)),
                Cell::from(format_money(p.total_expenses)),
                Cell::from(format_money(p.ebitda)).style(Style::default().fg(signed_color(p.ebitda))),
                Cell::from(format_percent(p.ebitda_margin_pct)),
                Cell::from(format_money(p.total_taxes)),
                Cell::from(format_money(p.net_profit))
                    .style(Style::default().fg(signed_color(p.net_profit))),
            ])
        })
        .collect();

    let ytd = &app.pl.ytd;
    rows.push(
        Row::new(vec![
            Cell::from("YTD"),
            Cell::from(format_money(ytd.total_revenue)),
            Cell::from(format_money(ytd.total_expenses)),
            Cell::from(format_money(ytd.ebitda)),
            Cell::from(format_percent(ytd.ebitda_margin_pct)),
            Cell::from(format_money(ytd.total_taxes)),
            Cell::from(format_money(ytd.net_profit)),
        ])
        .style(Style::default().add_modifier(Modifier::BOLD)),
    );

    let table = Table::new(
        rows,
        [
            Constraint::Length(16),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&[
        "Period", "Revenue", "Expenses", "EBITDA", "Margin", "Taxes", "Net",
    ]));

    render_table(f, area, &mut app.state, table, " Profit & Loss ");
}

fn render_unit_economics(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.unit.iter().map(|u| {
        Row::new(vec![
            Cell::from(u.period.name.clone()),
            Cell::from(format_money(u.arpu)),
            Cell::from(format_percent(u.churn_rate_pct)),
            Cell::from(format_money(u.cac)),
            Cell::from(format_money(u.ltv)),
            Cell::from(format!("{:.1}x", u.ltv_cac_ratio)),
            Cell::from(format!("{:.1}", u.payback_months)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(16),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(9),
        ],
    )
    .header(header_row(&[
        "Period", "ARPU", "Churn", "CAC", "LTV", "LTV/CAC", "Payback",
    ]));

    render_table(f, area, &mut app.state, table, " Unit Economics ");
}

fn render_status_bar(f: &mut Frame, area: Rect) {
    let status_spans = vec![
        Span::styled(" Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Page | "),
        Span::styled("1-4", Style::default().fg(Color::Yellow)),
        Span::raw(" Jump | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsboard::{seed_database, MemoryStore};

    fn seeded_app() -> App {
        let mut store = MemoryStore::new();
        seed_database(&mut store).unwrap();
        App::load(&store).unwrap()
    }

    #[test]
    fn test_page_cycle() {
        let mut page = Page::Dashboard;
        for _ in 0..Page::ALL.len() {
            page = page.next();
        }
        assert_eq!(page, Page::Dashboard);
        assert_eq!(Page::Dashboard.previous(), Page::UnitEconomics);
    }

    #[test]
    fn test_selection_wraps_per_page() {
        let mut app = seeded_app();

        // Dashboard has no table
        app.next();
        assert_eq!(app.state.selected(), Some(0));

        app.next_page();
        assert_eq!(app.current_page, Page::Regions);
        assert_eq!(app.row_count(), 6);
        app.previous();
        assert_eq!(app.state.selected(), Some(5));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_empty_store_loads() {
        let app = App::load(&MemoryStore::new()).unwrap();
        assert!(app.dashboard.is_none());
        assert_eq!(app.row_count(), 0);
    }
}
