//! Stage 6: situational intention strings from the mapping tree.
use crate::Context;
use crate::Stage;

pub struct IntentionMapper;

impl Stage for IntentionMapper {
    fn name(&self) -> &'static str {
        "intention"
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut analytic = hl_store::Analytic::open(&ctx.heavy_db)?;
        let rows: Vec<(i64, String, String, f64, i64, i64)> = {
            let mut stmt = analytic.connection().prepare(
                "SELECT rowid, street, action_label, j_score,
                        COALESCE(invested_this_action, 0), COALESCE(pot_before, 0)
                 FROM actions
                 WHERE intention IS NULL
                   AND action_label IS NOT NULL
                   AND j_score IS NOT NULL
                 ORDER BY hand_id, rowid",
            )?;
            stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<Result<_, _>>()?
        };

        let mut done = 0usize;
        let mut batch: Vec<(String, i64)> = Vec::new();
        for (rowid, street, label, j_score, invested, pot_before) in rows {
            let intent = ctx
                .intentions
                .intention(&street, &label, j_score, invested, pot_before);
            batch.push((intent, rowid));
            if batch.len() >= hl_core::INTENTION_BATCH_ROWS {
                done += apply(analytic.connection_mut(), &mut batch)?;
                log::info!("{} intentions assigned so far", done);
            }
        }
        done += apply(analytic.connection_mut(), &mut batch)?;
        log::info!("intention mapper: {} actions updated", done);
        Ok(())
    }
}

fn apply(conn: &mut rusqlite::Connection, batch: &mut Vec<(String, i64)>) -> anyhow::Result<usize> {
    let count = batch.len();
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached("UPDATE actions SET intention = ?1 WHERE rowid = ?2")?;
        for (intent, rowid) in batch.iter() {
            stmt.execute(rusqlite::params![intent, rowid])?;
        }
    }
    tx.commit()?;
    batch.clear();
    Ok(count)
}
