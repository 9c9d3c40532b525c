//! Stage 8: drop and rebuild the summary tables the read layer serves.
//!
//! All three tables are rebuilt in one transaction under the build lock,
//! so readers either see the previous generation or the new one. When
//! another process already holds the lock the stage reports and returns.
use crate::Context;
use crate::Stage;

pub struct Materializer;

const DASHBOARD_SQL: &str = "
SELECT
    COUNT(DISTINCT player_id)                       AS total_players,
    COUNT(DISTINCT hand_id)                         AS total_hands,
    ROUND(SUM(CASE WHEN action != 'f' AND street = 'preflop' THEN 1 ELSE 0 END) * 100.0 /
          NULLIF(SUM(CASE WHEN street = 'preflop' THEN 1 ELSE 0 END), 0), 1)  AS avg_vpip,
    ROUND(SUM(CASE WHEN action = 'r' AND street = 'preflop' THEN 1 ELSE 0 END) * 100.0 /
          NULLIF(SUM(CASE WHEN street = 'preflop' THEN 1 ELSE 0 END), 0), 1)  AS avg_pfr,
    AVG(j_score)                                    AS avg_j_score,
    COUNT(action_order)                             AS total_actions,
    ROUND(COALESCE(AVG(preflop_score),
                   AVG(CASE WHEN street = 'preflop' THEN j_score END)), 1)    AS avg_preflop_score,
    ROUND(COALESCE(AVG(postflop_score),
                   AVG(CASE WHEN street != 'preflop' THEN j_score END)), 1)   AS avg_postflop_score
FROM actions
WHERE player_id IS NOT NULL AND player_id != ''
";

const TOP_PLAYERS_SQL: &str = "
WITH base AS (
    SELECT
        a.player_id,
        a.nickname,
        COUNT(DISTINCT a.hand_id)                           AS hands_played,
        ROUND(AVG(a.j_score), 1)                            AS avg_j_score,
        ROUND(SUM(CASE WHEN a.action != 'f' AND a.street = 'preflop' THEN 1 ELSE 0 END) * 100.0 /
              NULLIF(SUM(CASE WHEN a.street = 'preflop' THEN 1 ELSE 0 END), 0), 1) AS vpip,
        ROUND(SUM(CASE WHEN a.action = 'r' AND a.street = 'preflop' THEN 1 ELSE 0 END) * 100.0 /
              NULLIF(SUM(CASE WHEN a.street = 'preflop' THEN 1 ELSE 0 END), 0), 1) AS pfr,
        ROUND(COALESCE(AVG(a.preflop_score),
                       AVG(CASE WHEN a.street = 'preflop' THEN a.j_score END)), 1)  AS avg_preflop_score,
        ROUND(COALESCE(AVG(a.postflop_score),
                       AVG(CASE WHEN a.street != 'preflop' THEN a.j_score END)), 1) AS avg_postflop_score,
        SUM(p.money_won)                                    AS total_winnings,
        AVG(h.big_blind)                                    AS avg_big_blind,
        COUNT(CASE WHEN a.solver_best IS NOT NULL THEN 1 END)  AS solver_cnt,
        COUNT(CASE WHEN a.solver_best = 'y' THEN 1 END)        AS solver_yes_cnt,
        COUNT(CASE WHEN a.street = 'river'
                    AND a.action_label = 'call' THEN 1 END)    AS river_calls,
        COUNT(CASE WHEN a.street = 'river'
                    AND a.action_label = 'call'
                    AND p.money_won > 0 THEN 1 END)            AS river_calls_won
    FROM actions a
    LEFT JOIN players   p ON p.hand_id = a.hand_id AND p.position = a.position
    LEFT JOIN hand_info h ON h.hand_id = a.hand_id
    WHERE a.player_id IS NOT NULL AND a.player_id != ''
    GROUP BY a.player_id, a.nickname
    HAVING COUNT(DISTINCT a.hand_id) > 10
),
avg_sizes AS (
    SELECT street, action_label, AVG(size_frac) AS avg_size
    FROM actions
    WHERE action = 'r' AND size_frac IS NOT NULL
    GROUP BY street, action_label
),
bet_dev AS (
    SELECT
        a.player_id,
        ROUND(AVG(ABS(a.size_frac - s.avg_size) / NULLIF(s.avg_size, 0) * 100), 0) AS bet_deviance
    FROM actions a
    JOIN avg_sizes s ON s.street = a.street AND s.action_label = a.action_label
    WHERE a.action = 'r' AND a.size_frac IS NOT NULL
    GROUP BY a.player_id
),
tilt AS (
    SELECT player_id,
           ROUND(100 - (
               AVG(CASE WHEN prev_money_won < 0  THEN j_score END) /
               NULLIF(AVG(CASE WHEN prev_money_won >= 0 THEN j_score END), 0)
           ) * 100, 0) AS tilt_factor
    FROM (
        SELECT a.player_id,
               a.j_score,
               LAG(p.money_won) OVER (PARTITION BY a.player_id ORDER BY a.hand_id)
                   AS prev_money_won
        FROM actions a
        JOIN players p ON p.hand_id = a.hand_id AND p.position = a.position
    )
    GROUP BY player_id
)
SELECT
    b.player_id,
    b.nickname,
    b.hands_played                                   AS total_hands,
    b.avg_j_score,
    b.vpip,
    b.pfr,
    b.avg_preflop_score,
    b.avg_postflop_score,
    ROUND(CASE WHEN b.avg_big_blind > 0
               THEN (b.total_winnings / b.avg_big_blind) / b.hands_played * 100
          END, 2)                                    AS winrate_bb100,
    ROUND(CASE WHEN b.solver_cnt > 0
               THEN b.solver_yes_cnt * 100.0 / b.solver_cnt
          END, 1)                                    AS solver_precision_score,
    ROUND(CASE WHEN b.river_calls > 0
               THEN b.river_calls_won * 100.0 / b.river_calls
          END, 0)                                    AS calldown_accuracy,
    d.bet_deviance,
    t.tilt_factor
FROM base b
LEFT JOIN bet_dev d ON d.player_id = b.player_id
LEFT JOIN tilt    t ON t.player_id = b.player_id
ORDER BY total_hands DESC
LIMIT 25
";

const PLAYER_SUMMARY_SQL: &str = "
SELECT
    a.player_id,
    a.nickname,
    COUNT(DISTINCT a.hand_id)                           AS hands_played,
    COUNT(a.action_order)                               AS total_actions,
    ROUND(AVG(a.j_score), 1)                            AS avg_j_score,
    ROUND(SUM(CASE WHEN a.action != 'f' AND a.street = 'preflop' THEN 1 ELSE 0 END) * 100.0 /
          NULLIF(SUM(CASE WHEN a.street = 'preflop' THEN 1 ELSE 0 END), 0), 1) AS vpip,
    ROUND(SUM(CASE WHEN a.action = 'r' AND a.street = 'preflop' THEN 1 ELSE 0 END) * 100.0 /
          NULLIF(SUM(CASE WHEN a.street = 'preflop' THEN 1 ELSE 0 END), 0), 1) AS pfr,
    ROUND(COALESCE(AVG(a.preflop_score),
                   AVG(CASE WHEN a.street = 'preflop' THEN a.j_score END)), 1)  AS avg_preflop_score,
    ROUND(COALESCE(AVG(a.postflop_score),
                   AVG(CASE WHEN a.street != 'preflop' THEN a.j_score END)), 1) AS avg_postflop_score,
    COUNT(CASE WHEN a.street = 'river'
                AND a.action_label = 'call' THEN 1 END)     AS river_calls,
    COUNT(CASE WHEN a.street = 'river'
                AND a.action_label = 'call'
                AND p.money_won > 0 THEN 1 END)             AS river_calls_won
FROM actions a
LEFT JOIN players p ON p.hand_id = a.hand_id AND p.position = a.position
WHERE a.player_id IS NOT NULL AND a.player_id != ''
GROUP BY a.player_id, a.nickname
";

/// Rebuilds the three summary tables atomically. Callable outside the
/// pipeline too (the read layer triggers it when the tables are missing).
pub fn rebuild(conn: &mut rusqlite::Connection) -> anyhow::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS dashboard_summary;
         CREATE TABLE dashboard_summary AS {DASHBOARD_SQL};
         DROP TABLE IF EXISTS top25_players;
         CREATE TABLE top25_players AS {TOP_PLAYERS_SQL};
         CREATE INDEX idx_top25_player_id ON top25_players(player_id);
         DROP TABLE IF EXISTS player_summary;
         CREATE TABLE player_summary AS {PLAYER_SUMMARY_SQL};
         CREATE INDEX idx_ps_player_id ON player_summary(player_id);"
    ))?;
    tx.commit()?;
    Ok(())
}

impl Stage for Materializer {
    fn name(&self) -> &'static str {
        "materialize"
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let Some(_lock) = hl_store::BuildLock::try_acquire(&ctx.heavy_db)? else {
            log::warn!("materialization already running elsewhere, skipping");
            return Ok(());
        };
        let mut analytic = hl_store::Analytic::open(&ctx.heavy_db)?;
        rebuild(analytic.connection_mut())?;
        log::info!("summary tables materialized");
        Ok(())
    }
}
