//! PDF reports for dispatch batches and purchase orders

use std::path::Path;

use sqlx::PgPool;

use crate::config::{DisplayZone, UploadConfig};
use crate::error::{AppError, AppResult};
use crate::pdf::PdfReport;
use crate::services::dispatch::{DispatchBatch, DispatchPhoto, DispatchService};
use crate::services::order::OrderService;
use shared::PhotoStage;

const ITEM_HEADERS: [&str; 3] = ["Producto", "Marca", "Cantidad"];
const ITEM_WIDTHS: [f32; 3] = [0.5, 0.3, 0.2];

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

/// A rendered PDF and its download name
#[derive(Debug)]
pub struct PdfFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Photo as listed in a report
#[derive(Debug, Clone)]
struct PhotoLine {
    stage: String,
    taken: String,
    path: String,
    present: bool,
}

async fn photo_lines(photos: &[DispatchPhoto], uploads: &UploadConfig, zone: DisplayZone) -> Vec<PhotoLine> {
    let dir = Path::new(&uploads.dir);
    let mut lines = Vec::with_capacity(photos.len());
    for photo in photos {
        let present = tokio::fs::metadata(dir.join(&photo.path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        lines.push(PhotoLine {
            stage: photo.stage.clone(),
            taken: zone.format_seconds(photo.created_at),
            path: photo.path.clone(),
            present,
        });
    }
    lines
}

fn item_rows(batch: &DispatchBatch) -> Vec<Vec<String>> {
    batch
        .items
        .iter()
        .map(|e| vec![e.name.clone(), e.brand.clone(), e.quantity.to_string()])
        .collect()
}

fn render_photos(report: &mut PdfReport, photos: &[PhotoLine]) {
    if photos.is_empty() {
        report.text_line("Sin fotos adjuntas.");
        report.spacer(4.0);
        return;
    }

    for stage in PhotoStage::ALL {
        let staged: Vec<&PhotoLine> = photos.iter().filter(|p| p.stage == stage.as_str()).collect();
        if staged.is_empty() {
            continue;
        }
        report.heading(&format!("Fotos {}", stage.as_str()), 12.0);
        for photo in staged {
            if photo.present {
                report.text_line(&format!("{}  {}", photo.taken, photo.path));
            } else {
                report.text_line(&format!("[Archivo faltante: {}]", photo.path));
            }
        }
        report.spacer(4.0);
    }
}

fn render_dispatch(report: &mut PdfReport, batch: &DispatchBatch, photos: &[PhotoLine]) {
    report.heading(&format!("Despacho #{}", batch.id), 16.0);
    report.key_values(&[
        ("Cliente", batch.client.clone()),
        ("Operador", batch.operator.clone()),
        ("Fecha", batch.date.clone()),
        ("Orden #", batch.order_number.clone().unwrap_or_default()),
    ]);
    report.table(&ITEM_HEADERS, &ITEM_WIDTHS, &item_rows(batch));
    render_photos(report, photos);
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// PDF for one dispatch batch
    pub async fn dispatch_pdf(&self, batch_id: i64, uploads: &UploadConfig, zone: DisplayZone) -> AppResult<PdfFile> {
        let dispatches = DispatchService::new(self.db.clone());
        let batch = dispatches.get_batch(batch_id, zone).await?;
        let photos = dispatches.list_photos(batch_id).await?;
        let photos = photo_lines(&photos, uploads, zone).await;

        let mut report = PdfReport::new();
        render_dispatch(&mut report, &batch, &photos);
        tracing::debug!(batch_id, pages = report.page_count(), "Dispatch report rendered");
        let bytes = report
            .finish()
            .map_err(|e| AppError::Report(format!("dispatch {}: {}", batch_id, e)))?;

        Ok(PdfFile {
            file_name: format!("despacho_{}.pdf", batch_id),
            bytes,
        })
    }

    /// PDF for a purchase order followed by each dispatch tagged with it
    pub async fn order_pdf(&self, order_id: i64, uploads: &UploadConfig, zone: DisplayZone) -> AppResult<PdfFile> {
        let detail = OrderService::new(self.db.clone()).get_detail(order_id, zone).await?;

        let batch_ids: Vec<i64> = detail.dispatches.iter().map(|b| b.id).collect();
        let mut photos = DispatchService::new(self.db.clone()).photos_for(&batch_ids).await?;

        let mut report = PdfReport::new();
        report.heading(&format!("Orden de compra #{}", detail.order.number), 16.0);
        report.key_values(&[
            ("Cliente", detail.order.client.clone()),
            ("Fecha creación", detail.order.date.clone()),
            ("Estado", detail.order.status.label().to_string()),
        ]);
        let rows: Vec<Vec<String>> = detail
            .items
            .iter()
            .map(|i| vec![i.name.clone(), i.brand.clone(), i.progress.requested.to_string()])
            .collect();
        report.table(&ITEM_HEADERS, &ITEM_WIDTHS, &rows);

        if detail.dispatches.is_empty() {
            report.text_line("Sin despachos asociados.");
        }
        for batch in &detail.dispatches {
            let batch_photos = photos.remove(&batch.id).unwrap_or_default();
            let lines = photo_lines(&batch_photos, uploads, zone).await;
            render_dispatch(&mut report, batch, &lines);
        }

        tracing::debug!(order_id, pages = report.page_count(), "Order report rendered");
        let bytes = report
            .finish()
            .map_err(|e| AppError::Report(format!("order {}: {}", order_id, e)))?;

        Ok(PdfFile {
            file_name: format!("orden_{}.pdf", detail.order.number.replace(['/', '\\', '"'], "_")),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::EntryView;
    use chrono::Utc;

    fn batch() -> DispatchBatch {
        DispatchBatch {
            id: 7,
            client_id: 1,
            client: "Constructora Andes".to_string(),
            operator: "bodega1".to_string(),
            order_number: Some("OC-55".to_string()),
            created_at: Utc::now(),
            date: "01/05/2024 10:00".to_string(),
            total_units: 3,
            items: vec![EntryView {
                entry_id: 1,
                batch_id: 7,
                product_id: 2,
                name: "Cemento".to_string(),
                brand: "Polpaico".to_string(),
                quantity: 3,
            }],
        }
    }

    #[test]
    fn test_render_dispatch_with_photos() {
        let photos = vec![
            PhotoLine {
                stage: "entrega".to_string(),
                taken: "01/05/2024 12:00:00".to_string(),
                path: "dispatch_7_entrega_1.jpg".to_string(),
                present: false,
            },
            PhotoLine {
                stage: "salida".to_string(),
                taken: "01/05/2024 10:05:00".to_string(),
                path: "dispatch_7_salida_1.jpg".to_string(),
                present: true,
            },
        ];
        let mut report = PdfReport::new();
        render_dispatch(&mut report, &batch(), &photos);
        let bytes = report.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_item_rows() {
        assert_eq!(
            item_rows(&batch()),
            vec![vec!["Cemento".to_string(), "Polpaico".to_string(), "3".to_string()]]
        );
    }
}
