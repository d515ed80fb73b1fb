pub mod download;
pub mod info;

use abrdl_engine::VideoDetails;

/// Prints the video summary shared by `info` and `download`.
pub fn print_details(details: &VideoDetails) {
    println!("==================================================================");
    println!("Title: {}", details.title);
    println!("Duration: {}", details.duration_label());
    println!("Views: {}", details.view_count);
    println!("Author: {}", details.author);
    println!("Video ID: {}", details.id);
    println!("==================================================================");
}
