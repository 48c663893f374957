//! Curated source registry for ingested documents.
//!
//! Folder titles that match an entry here get that entry's canonical URL
//! as their citation link; everything else falls back to the uploaded PDF.

pub const UNIVERSITY_LOGO: &str =
    "https://res.cloudinary.com/admichat/image/upload/v1/logo/logo-admichat.webp";

pub struct SourceLink {
    pub id: &'static str,
    pub title: &'static str,
    pub url: &'static str,
}

pub const SOURCE_LINKS: &[SourceLink] = &[
    SourceLink {
        id: "thông_tin_tuyển_sinh_năm_2024",
        title: "THÔNG TIN TUYỂN SINH NĂM 2024",
        url: "https://admichat.edu.vn/tuyen-sinh/tin-tuyen-sinh/thong-tin-tuyen-sinh-nam-2024",
    },
    SourceLink {
        id: "các_ngành_đào_tạo_thực_tiễn_đáp_ứng_nhu_cầu_xã_hội",
        title: "Các ngành đào tạo thực tiễn đáp ứng nhu cầu xã hội",
        url: "https://admichat.edu.vn/dao-tao/cac-nganh-dao-tao",
    },
    SourceLink {
        id: "học_phí_và_chính_sách_học_bổng_2024",
        title: "Học phí và chính sách học bổng 2024",
        url: "https://admichat.edu.vn/tuyen-sinh/hoc-phi-va-hoc-bong-2024",
    },
    SourceLink {
        id: "hướng_dẫn_dành_cho_tân_sinh_viên",
        title: "Hướng dẫn dành cho tân sinh viên",
        url: "https://admichat.edu.vn/sinh-vien/huong-dan-tan-sinh-vien",
    },
    SourceLink {
        id: "nội_quy_học_tập",
        title: "Nội Quy Học Tập",
        url: "https://admichat.edu.vn/sinh-vien/noi-quy-hoc-tap",
    },
    SourceLink {
        id: "điểm_chuẩn_các_năm_gần_đây",
        title: "Điểm chuẩn các năm gần đây",
        url: "https://admichat.edu.vn/tuyen-sinh/diem-chuan",
    },
];

pub fn find_by_title(title: &str) -> Option<&'static SourceLink> {
    SOURCE_LINKS.iter().find(|link| link.title == title)
}
