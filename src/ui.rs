use std::time::Duration;

use screenapp_upload::{StoredObject, UploadEvent};

pub fn print_event(event: &UploadEvent) {
    match event {
        UploadEvent::Started {
            total_parts,
            total_bytes,
        } => {
            println!(
                "Uploading {} bytes in {} part(s)",
                total_bytes, total_parts
            );
        }
        UploadEvent::Initialized(session) => {
            println!("Upload session opened for file ID: {}", session.file_id);
        }
        UploadEvent::PartUploaded(p) => {
            let percent = (p.bytes_uploaded as f32 / p.total_bytes as f32) * 100.0;
            println!(
                "Uploaded part {} ({}/{}, {:.1}%)",
                p.part_number, p.parts_completed, p.total_parts, percent
            );
        }
        UploadEvent::Finalizing { .. } => println!("Finalizing upload..."),
        UploadEvent::Complete(_) => println!("Upload completed successfully"),
    }
}

pub fn print_success(object: &StoredObject, elapsed: Duration) {
    let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
    println!(
        "File uploaded successfully in {}!",
        humantime::format_duration(elapsed)
    );
    match serde_json::to_string_pretty(object) {
        Ok(json) => println!("File: {}", json),
        Err(_) => println!("File ID: {}", object.file_id),
    }
}

pub fn print_error(error: &anyhow::Error) {
    eprintln!("Error: {:#}", error);
}
