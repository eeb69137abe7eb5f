use crate::commands::parse_period;
use crate::store::{Period, PeriodRecord, UserTotals};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::time::Duration;

const EMBED_COLOR: u32 = 0x7289DA;

/// Show voice time statistics for a month
#[poise::command(slash_command, guild_only)]
pub async fn stats(
    ctx: Context<'_>,
    #[description = "Month to report, as MM/YYYY (defaults to the current month)"]
    period: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;

    let period = match parse_period(period.as_deref()) {
        Ok(period) => period,
        Err(e) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!("❌ {}", e))
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }
    };

    ctx.defer_ephemeral().await?;

    let record = ctx.data().store.load_period(guild_id.get(), period).await?;
    if record.is_empty() {
        ctx.say("📊 No data to show for the selected period.").await?;
        return Ok(());
    }

    let ranked = ranked(&record);
    let total: u64 = ranked.iter().map(|user| user.total_minutes).sum();
    let top = ranked
        .iter()
        .take(5)
        .enumerate()
        .map(|(i, user)| {
            format!(
                "{}. **{}** - {}",
                i + 1,
                user.username,
                format_minutes(user.total_minutes)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let embed = serenity::CreateEmbed::new()
        .title(format!("📊 Voice Statistics - {}", period))
        .color(EMBED_COLOR)
        .field(
            "📈 General Summary",
            format!(
                "**Tracked users:** {}\n**Total time:** {}",
                ranked.len(),
                format_minutes(total)
            ),
            false,
        )
        .field("👑 Top Users", top, false)
        .timestamp(serenity::Timestamp::now());

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show accumulated minutes for the current month in real time
#[poise::command(slash_command, guild_only)]
pub async fn live(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;
    let guild_name = ctx
        .guild()
        .map(|guild| guild.name.clone())
        .unwrap_or_else(|| guild_id.to_string());

    ctx.defer_ephemeral().await?;

    let period = Period::current();
    let record = ctx.data().store.load_period(guild_id.get(), period).await?;
    if record.is_empty() {
        ctx.say("📊 No accumulated minutes to show for this month.")
            .await?;
        return Ok(());
    }

    let top = ranked(&record)
        .iter()
        .take(10)
        .enumerate()
        .map(|(i, user)| format!("{}. **{}** - {} minutes", i + 1, user.username, user.total_minutes))
        .collect::<Vec<_>>()
        .join("\n");

    let embed = serenity::CreateEmbed::new()
        .title(format!("📊 Accumulated Minutes - {}", guild_name))
        .color(EMBED_COLOR)
        .field(format!("⏱️ Top Users ({})", period), top, false)
        .footer(serenity::CreateEmbedFooter::new(live_footer(
            ctx.data().config.tick_interval_secs,
        )))
        .timestamp(serenity::Timestamp::now());

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Users sorted by accumulated minutes, highest first.
fn ranked(record: &PeriodRecord) -> Vec<&UserTotals> {
    let mut users: Vec<&UserTotals> = record.values().collect();
    users.sort_by(|a, b| b.total_minutes.cmp(&a.total_minutes));
    users
}

fn live_footer(tick_interval_secs: u64) -> String {
    format!(
        "Current month data • Updated every {}",
        humantime::format_duration(Duration::from_secs(tick_interval_secs))
    )
}

fn format_minutes(minutes: u64) -> String {
    if minutes == 0 {
        return "0m".to_string();
    }
    humantime::format_duration(Duration::from_secs(minutes * 60)).to_string()
}
