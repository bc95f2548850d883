//! Built-in prompt templates.
//!
//! Templates are plain data: the pipeline fills placeholders and hands the
//! text to the agent runtime without inspecting it. Any template can be
//! replaced from the configuration file.

use thesis_models::config::{ResearchTopic, RoleTemplate};
use thesis_models::work::AgentProfile;

pub const RESEARCH_PLACEHOLDER: &str = "{research}";
pub const HYPOTHESIS_PLACEHOLDER: &str = "{hypothesis}";
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";
pub const DATE_PLACEHOLDER: &str = "{date}";

const WEB_SEARCH_TOOL: &str = "WebSearch";

const SEARCH_GUIDANCE: &str = "\n\nUse the web search tool to find up-to-date information. Formulate \
     queries from the research topic, pass only simple text strings, and extract the key insights \
     from the results.";

const SUMMARY_SHAPE: &str = "A structured, 3-5 paragraph long summary including:\n";

/// Substitute `{name}` placeholders in a single pass, so substituted values
/// are never rendered again. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some((pos, key, value)) = vars
        .iter()
        .filter(|(key, _)| !key.is_empty())
        .filter_map(|(key, value)| rest.find(key).map(|pos| (pos, *key, *value)))
        .min_by_key(|(pos, _, _)| *pos)
    {
        out.push_str(&rest[..pos]);
        out.push_str(value);
        rest = &rest[pos + key.len()..];
    }

    out.push_str(rest);
    out
}

/// Sentence anchoring agents to the current date.
pub fn date_line(today: chrono::NaiveDate) -> String {
    format!(
        "\n\nToday's date is {}. Base your analysis on the most recent information available as of this date.",
        today.format("%Y-%m-%d")
    )
}

fn profile(role: &str, goal: &str, backstory: &str, tools: &[&str]) -> AgentProfile {
    AgentProfile {
        role: role.to_string(),
        goal: goal.to_string(),
        backstory: backstory.to_string(),
        model: None,
        tools: tools.iter().map(|t| t.to_string()).collect(),
    }
}

fn research_topic(
    name: &str,
    role: &str,
    goal: &str,
    backstory: &str,
    description: &str,
    bullets: &[&str],
) -> ResearchTopic {
    let expected_output = bullets
        .iter()
        .fold(SUMMARY_SHAPE.to_string(), |mut text, bullet| {
            text.push_str("- ");
            text.push_str(bullet);
            text.push('\n');
            text
        });

    ResearchTopic {
        name: name.to_string(),
        template: RoleTemplate {
            agent: profile(role, goal, backstory, &[WEB_SEARCH_TOOL]),
            description: format!("{description}{SEARCH_GUIDANCE}{DATE_PLACEHOLDER}"),
            expected_output,
            schema: None,
        },
    }
}

/// The six macro research topics run in the research stage.
pub fn research_topics() -> Vec<ResearchTopic> {
    vec![
        research_topic(
            "fed-policy",
            "Federal Reserve Policy Analyst",
            "Track, interpret, and forecast Federal Reserve monetary policy: rate decisions, balance \
             sheet changes, and FOMC communication.",
            "You are a macroeconomic researcher at a hedge fund focused on central bank policy. You \
             combine FOMC statements, minutes and speeches with market pricing such as Fed Funds \
             futures, breakevens and Treasury yields.",
            "Assess the likely path of Federal Reserve policy over the next 1-3 FOMC meetings. Review \
             meeting minutes, official speeches, CPI, PCE and unemployment releases, and credible \
             media coverage. Identify consensus expectations, recent signaling, shifts in tone, and \
             the key risks to that path.",
            &[
                "2-3 specific examples of concerning trends",
                "Citations of relevant data or sources",
                "Commentary on potential policy paths, including what the market is pricing in",
            ],
        ),
        research_topic(
            "banking-risk",
            "Banking System Risk Analyst",
            "Monitor banking-sector stability and identify early warning signs of systemic stress.",
            "You are a macroeconomic researcher at a hedge fund tasked with identifying risks in the \
             banking sector from regulatory filings, central bank reports and market data.",
            "Research signs of fragility in the U.S. banking system, focusing on small and mid-sized \
             banks: unrealized losses, deposit flight risk, commercial real estate exposure, and \
             tightening liquidity. Use sources such as the FDIC, the Federal Reserve and major \
             financial media.",
            &[
                "Key fragility indicators and the most exposed institutions or regions",
                "2-3 specific examples of concerning trends",
                "Citations of relevant data or sources",
                "Commentary on contagion channels or systemic implications",
            ],
        ),
        research_topic(
            "capital-flows",
            "Global Capital Flows Analyst",
            "Explain where global capital is moving and why.",
            "You are a cross-border flows strategist at a hedge fund who follows IMF and BIS data, \
             fund flows and sovereign wealth fund activity.",
            "Investigate recent trends in global capital flows: cross-border investment, emerging \
             market inflows and outflows, and sovereign wealth fund activity. Identify which regions \
             or asset classes are attracting or losing capital, and the macro drivers behind the \
             shifts.",
            &[
                "Key capital flow trends and their regional or asset concentration",
                "2-3 illustrative examples with data-driven support",
                "Relevant institutional commentary or policy responses",
                "Implications for exchange rates, bond markets, or systemic liquidity",
                "Citations of relevant data or sources",
            ],
        ),
        research_topic(
            "fiscal-policy",
            "Fiscal Policy Analyst",
            "Assess fiscal policy and sovereign balance sheet health across major economies.",
            "You are a sovereign credit researcher at a hedge fund who tracks debt issuance, deficits \
             and interest expense.",
            "Analyze fiscal developments across major economies: debt issuance, interest expense, \
             budget deficits, and government responses to slowdowns. Highlight countries with rising \
             fiscal risk and the impact on bond markets and policy flexibility.",
            &[
                "Overview of fiscal risk indicators in key economies",
                "2-3 countries with deteriorating or improving fiscal trends",
                "Commentary on rating actions, crowding out, or inflationary pressure",
                "Citations of official data or credible reports",
            ],
        ),
        research_topic(
            "growth",
            "Macro Growth Analyst",
            "Detect turning points in the business cycle from leading indicators.",
            "You are a business-cycle economist at a hedge fund who reads PMIs, industrial \
             production and sentiment surveys.",
            "Monitor leading indicators such as PMIs, industrial production, durable goods orders, \
             and business sentiment. Identify early signals of turning points or regional divergence.",
            &[
                "Key changes in macro indicators across major regions",
                "Notable surprises in recent releases",
                "Implications for growth forecasts or risk sentiment",
                "Citations of official data or credible reports",
            ],
        ),
        research_topic(
            "inflation",
            "Inflation and Labor Market Analyst",
            "Assess the balance between inflation pressure and labor market strength.",
            "You are a labor and prices economist at a hedge fund who follows CPI, PPI, wages and \
             job openings.",
            "Track labor market and inflation data, including CPI, PPI, wage growth, participation \
             and job openings. Assess the balance between inflation pressure and employment strength.",
            &[
                "Trends in inflation versus labor market strength",
                "Signs of wage-price spirals or disinflation",
                "Market or policy expectations based on recent prints",
                "Cited data sources",
            ],
        ),
    ]
}

/// Trader: turns the joined research document into a raw hypothesis.
pub fn trader_template() -> RoleTemplate {
    RoleTemplate {
        agent: profile(
            "Trader",
            "Turn macro research into an actionable, specific trade hypothesis.",
            "You are a systematic macro trader at an AI-driven hedge fund. You receive the research \
             team's findings and propose trades; you log decisions instead of executing them.",
            &[WEB_SEARCH_TOOL],
        ),
        description: format!(
            "Using the following summarized macro research, generate one trading hypothesis and \
             portfolio strategy:\n\n{RESEARCH_PLACEHOLDER}\n\n\
             Your output should:\n\
             - Propose one distinct macro hypothesis\n\
             - Suggest corresponding trade expressions (equities, rates, spreads, FX, commodities)\n\
             - Include reasoning (macro drivers, risks, catalysts)\n\
             - Identify key risk factors and alternative scenarios\n\
             - Provide a clear investment thesis and time horizon\n\
             - Be actionable, specific, and suitable for a portfolio construction agent\
             {DATE_PLACEHOLDER}"
        ),
        expected_output: format!(
            "Respond ONLY with JSON that strictly follows this schema:\n{SCHEMA_PLACEHOLDER}"
        ),
        schema: Some("raw_trade_thesis".to_string()),
    }
}

pub fn critic_template() -> RoleTemplate {
    RoleTemplate {
        agent: profile(
            "Hypothesis Critic",
            "Critically evaluate trading hypotheses for weaknesses and risks.",
            "You are a skeptical, detail-oriented risk manager at a hedge fund. You identify flaws, \
             hidden assumptions, and risks before any capital is allocated.",
            &[WEB_SEARCH_TOOL],
        ),
        description: format!(
            "You are given trading hypothesis JSON:\n\n{HYPOTHESIS_PLACEHOLDER}\n\n\
             Critique it by identifying weaknesses, unaccounted risks, and assumptions that may fail."
        ),
        expected_output: "Respond ONLY with a JSON object: \
                          {\"hypothesis_name\": string, \"critique\": string}."
            .to_string(),
        schema: None,
    }
}

pub fn refiner_template() -> RoleTemplate {
    RoleTemplate {
        agent: profile(
            "Hypothesis Refiner",
            "Refine trading hypotheses into robust, testable trade theses.",
            "You are a senior strategist who improves ideas by addressing likely critiques and makes \
             sure they conform to the trade thesis schema.",
            &[WEB_SEARCH_TOOL],
        ),
        description: format!(
            "You are given trading hypothesis JSON:\n\n{HYPOTHESIS_PLACEHOLDER}\n\n\
             Refine it into a more robust trade thesis: strengthen the macro drivers, state the \
             catalysts, address the main risks, and make the trade expressions specific.\
             {DATE_PLACEHOLDER}"
        ),
        expected_output: format!(
            "Respond ONLY with JSON that strictly follows this schema:\n{SCHEMA_PLACEHOLDER}"
        ),
        schema: Some("trade_thesis".to_string()),
    }
}

pub fn portfolio_template() -> RoleTemplate {
    RoleTemplate {
        agent: profile(
            "Portfolio Construction Strategist",
            "Translate trade hypotheses into an actionable portfolio with weights and risk controls.",
            "You are an experienced multi-asset portfolio manager who balances conviction with \
             diversification and risk management.",
            &[],
        ),
        description: format!(
            "You are given trading hypothesis JSON:\n\n{HYPOTHESIS_PLACEHOLDER}\n\n\
             Translate it into a structured portfolio with asset tickers, weights and rationale, \
             portfolio-level risk metrics, and a clear objective. Weights must sum to 1."
        ),
        expected_output: format!(
            "Respond ONLY with JSON that strictly follows this schema, where the name property \
             matches the hypothesis name exactly:\n{SCHEMA_PLACEHOLDER}"
        ),
        schema: Some("portfolio".to_string()),
    }
}
